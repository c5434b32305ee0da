use crate::{
    admission::AdmissionPolicy,
    error::{unsupported_protocol, unsupported_version},
    wire::{read_header, write_header},
};
use amqp_core::contract::{CallContext, Cancellation, Deadline};
use amqp_core::error::{AmqpError, ErrorCategory};
use amqp_core::header::ProtocolHeader;
use amqp_core::time::monotonic_now;
use amqp_transport::{
    BoxTransport, NegotiationRole, ProtocolProvider, ProviderChain, Transport,
    TransportSocketAddr, UpgradeOutcome,
};
use amqp_transport_tcp::{TcpChannel, TcpListener, TcpSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 监听端配置：握手超时、准入策略与基座 TCP 选项。
#[derive(Clone, Debug)]
pub struct ListenerSettings {
    handshake_timeout: Duration,
    admission: AdmissionPolicy,
    tcp: TcpSettings,
}

impl ListenerSettings {
    /// 使用默认值构造配置。
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖单连接握手超时（默认 10 秒）。
    ///
    /// 超时为固定值而非外部注入的截止时间：停滞的对端最多占用一个
    /// 处理任务这么久。
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// 覆盖准入策略。
    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// 覆盖基座 TCP 配置。
    pub fn with_tcp_settings(mut self, tcp: TcpSettings) -> Self {
        self.tcp = tcp;
        self
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            admission: AdmissionPolicy::default(),
            tcp: TcpSettings::default(),
        }
    }
}

/// 协商完成并通过准入的入站连接。
#[derive(Debug)]
pub struct AcceptedConnection {
    /// 终端传输层，已消费完最后一个协议头。
    pub transport: BoxTransport,
    /// 被消费的终端协议头，供更高协议层回显与版本判定。
    pub header: ProtocolHeader,
    /// 对端地址。
    pub peer_addr: Option<TransportSocketAddr>,
}

/// 传输监听端：每条入站连接独立协商的服务端引擎。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 镜像发起端的升级序列：读取对端协议头、匹配 Provider、回显确认、
///   构造新层，循环到终端协议；对端可以叠加任意多级升级；
/// - 处理器之间不共享可变状态：Provider 链与准入策略只读共享，任何
///   单条连接的失败只影响它自己。
///
/// ## 逻辑（How）
/// - `run`：接受循环；每条连接派生"父级取消 + 固定握手截止"的子
///   上下文后交由独立任务协商，成功的连接经通道上交，失败的连接
///   以告警日志丢弃；
/// - `accept_one`：同语义的内联版本，服务测试与低并发宿主；
/// - 关停：取消 [`NegotiationListener::shutdown_handle`] 返回的令牌，
///   接受循环与所有在途握手在下一个检查点退出。
///
/// ## 契约（What）
/// - 未配置的协议号：回写终端 Provider 的默认头部后拒绝；
/// - 不支持的版本：回写该 Provider 的最优版本后拒绝；
/// - 终端协议：先过准入策略——不满足时回写"应当先升级"的提示头部
///   并拒绝；满足时连同已消费的头部一起上交；
/// - 任何失败路径都关闭传输层，绝不向上层交付半协商的连接。
#[derive(Debug)]
pub struct NegotiationListener {
    listener: TcpListener,
    chain: Arc<ProviderChain>,
    settings: ListenerSettings,
    shutdown: Cancellation,
}

impl NegotiationListener {
    /// 绑定监听地址。
    pub async fn bind(
        addr: TransportSocketAddr,
        chain: Arc<ProviderChain>,
        settings: ListenerSettings,
    ) -> Result<Self, AmqpError> {
        let listener = TcpListener::bind_with_settings(addr, settings.tcp.clone()).await?;
        Ok(Self {
            listener,
            chain,
            settings,
            shutdown: Cancellation::new(),
        })
    }

    /// 监听器实际绑定的地址。
    pub fn local_addr(&self) -> TransportSocketAddr {
        self.listener.local_addr()
    }

    /// 关停句柄：取消后接受循环与在途握手尽快退出。
    pub fn shutdown_handle(&self) -> Cancellation {
        self.shutdown.child()
    }

    /// 接受并协商一条连接（内联执行，服务测试与低并发宿主）。
    pub async fn accept_one(&self) -> Result<AcceptedConnection, AmqpError> {
        let accept_ctx = CallContext::builder()
            .with_cancellation(self.shutdown.child())
            .build();
        let (channel, _) = self.listener.accept(&accept_ctx).await?;
        let ctx = self.handshake_context();
        negotiate_inbound(
            &ctx,
            &self.chain,
            self.settings.admission,
            channel,
        )
        .await
    }

    /// 接受循环：成功协商的连接经 `sink` 上交，失败的连接丢弃。
    ///
    /// 返回 `Ok(())` 表示因关停（取消）而正常退出。
    pub async fn run(&self, sink: mpsc::Sender<AcceptedConnection>) -> Result<(), AmqpError> {
        let accept_ctx = CallContext::builder()
            .with_cancellation(self.shutdown.child())
            .build();
        loop {
            let (channel, peer) = match self.listener.accept(&accept_ctx).await {
                Ok(accepted) => accepted,
                Err(err) if matches!(err.category(), ErrorCategory::Cancelled) => {
                    tracing::debug!("监听器因关停退出接受循环");
                    return Ok(());
                }
                Err(err) => {
                    // 瞬时接受失败不影响监听器本身的可用性；按建议退避后继续。
                    let wait = match err.category() {
                        ErrorCategory::Retryable(advice) => advice.wait(),
                        _ => Duration::from_millis(50),
                    };
                    tracing::warn!(error = %err, "接受连接失败，退避后继续监听");
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let ctx = self.handshake_context();
            let chain = Arc::clone(&self.chain);
            let admission = self.settings.admission;
            let sink = sink.clone();
            tokio::spawn(async move {
                match negotiate_inbound(&ctx, &chain, admission, channel).await {
                    Ok(accepted) => {
                        if let Err(tokio::sync::mpsc::error::SendError(connection)) =
                            sink.send(accepted).await
                        {
                            connection.transport.abort();
                            tracing::debug!("接收方已关闭，关闭协商完成的连接");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, peer = %peer, "入站协商失败，连接已丢弃");
                    }
                }
            });
        }
    }

    fn handshake_context(&self) -> CallContext {
        CallContext::builder()
            .with_cancellation(self.shutdown.child())
            .with_deadline(Deadline::with_timeout(
                monotonic_now(),
                self.settings.handshake_timeout,
            ))
            .build()
    }
}

/// 单条入站连接的升级循环。
async fn negotiate_inbound(
    ctx: &CallContext,
    chain: &ProviderChain,
    admission: AdmissionPolicy,
    channel: TcpChannel,
) -> Result<AcceptedConnection, AmqpError> {
    let mut transport: BoxTransport = channel.boxed();
    loop {
        let header = match read_header(ctx, transport.as_ref()).await {
            Ok(header) => header,
            Err(err) => {
                transport.abort();
                return Err(err);
            }
        };
        tracing::debug!(%header, "收到入站协议头");

        let Some(provider) = chain.lookup(header.id()) else {
            // 未配置的协议：回写本端支持的终端头部后拒绝。
            let fallback = chain.terminal().default_header();
            let _ = write_header(ctx, transport.as_ref(), fallback).await;
            transport.abort();
            return Err(unsupported_protocol(header.id()));
        };
        if !provider.supports(header.version()) {
            let best = provider.default_header();
            let _ = write_header(ctx, transport.as_ref(), best).await;
            transport.abort();
            return Err(unsupported_version(header.id(), header.version()));
        }

        if provider.is_terminal() {
            let security = transport.security();
            if let Err(reason) = admission.check(&security) {
                if let Some(required) = admission.required_header(chain) {
                    let _ = write_header(ctx, transport.as_ref(), required).await;
                }
                transport.abort();
                return Err(reason);
            }
            return Ok(AcceptedConnection {
                peer_addr: transport.peer_addr(),
                transport,
                header,
            });
        }

        // 升级路径：先在当前层回显确认，再构造新层。
        if let Err(err) = write_header(ctx, transport.as_ref(), header).await {
            transport.abort();
            return Err(err);
        }
        match provider
            .upgrade(ctx, transport, NegotiationRole::Listener)
            .await?
        {
            UpgradeOutcome::Upgraded(next) | UpgradeOutcome::Terminal(next) => {
                transport = next;
            }
            UpgradeOutcome::Rejected { transport, reason } => {
                transport.abort();
                return Err(reason);
            }
        }
    }
}
