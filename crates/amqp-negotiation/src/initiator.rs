use crate::{
    error::{chain_exhausted, version_mismatch},
    wire::{read_header, write_header},
};
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_transport::{
    BoxTransport, NegotiationRole, ProtocolProvider, ProviderChain, Transport,
    TransportSocketAddr, UpgradeOutcome,
};
use amqp_transport_tcp::{TcpChannel, TcpSettings};
use std::sync::Arc;

/// 协商完成的成果：终端传输层及其升级计数。
#[derive(Debug)]
pub struct EstablishedTransport {
    /// 可交付上层协议栈的终端传输层。
    pub transport: BoxTransport,
    /// 基座之上发生的升级次数。
    pub upgrades: usize,
}

/// 传输发起端：按 Provider 链驱动"建连 → 逐步升级"的客户端引擎。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把多步升级协商收敛为一次 `connect` 调用：上层拿到的要么是完成
///   全部升级的终端传输层，要么是携带最内层根因的单个错误；
/// - 单一绝对截止时间贯穿建连与所有协商步骤：每一步消耗的时间自动
///   反映在剩余预算中，无需逐步换算。
///
/// ## 逻辑（How）
/// 1. 建立基座 TCP 连接；
/// 2. 链首 Provider 若为终端，跳过头部交换直接完成；
/// 3. 否则写出 `{协议号, 默认版本}` 头部并读取对端的 8 字节回显；
/// 4. 回显不等于发送值即以版本不匹配终态失败——不会以对端通告的
///    版本自动重试；
/// 5. 回显匹配后请求 Provider 以发起端角色包装传输层（其自身握手在
///    包装内完成），推进到下一 Provider；
/// 6. 循环直至遇到终端 Provider。
///
/// ## 契约（What）
/// - **后置条件**：成功时传输层恰好按链序被包装；失败时最近打开的
///   层已被关闭，不存在悬挂的半开传输；
/// - 协商要么整体成功（到达终端协议），要么整体失败，没有部分成功态。
///
/// ## 注意事项（Trade-offs）
/// - 升级失败时旧层已被拆解进新层的握手流程，资源经 Drop 释放而非
///   显式 `abort`；两者对对端均表现为连接关闭。
#[derive(Clone, Debug)]
pub struct TransportInitiator {
    chain: Arc<ProviderChain>,
    target: TransportSocketAddr,
    settings: TcpSettings,
}

impl TransportInitiator {
    /// 以 Provider 链与目标地址构造发起端。
    pub fn new(chain: Arc<ProviderChain>, target: TransportSocketAddr) -> Self {
        Self {
            chain,
            target,
            settings: TcpSettings::default(),
        }
    }

    /// 覆盖基座 TCP 配置。
    pub fn with_tcp_settings(mut self, settings: TcpSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 建连并驱动整条升级链，单一截止时间覆盖全程。
    pub async fn connect(&self, ctx: &CallContext) -> Result<EstablishedTransport, AmqpError> {
        let channel = TcpChannel::connect(ctx, self.target, self.settings.clone()).await?;
        tracing::debug!(target = %self.target, "基座连接已建立，开始升级协商");
        let mut transport: BoxTransport = channel.boxed();
        let mut upgrades = 0usize;

        for provider in self.chain.providers() {
            if provider.is_terminal() {
                tracing::debug!(upgrades, "到达终端协议，协商完成");
                return Ok(EstablishedTransport { transport, upgrades });
            }

            let header = provider.default_header();
            tracing::debug!(%header, "发送协商协议头");
            if let Err(err) = exchange_header(ctx, transport.as_ref(), header).await {
                // 失败路径：关闭最近打开的层后上抛根因。
                transport.abort();
                return Err(err);
            }

            match provider
                .upgrade(ctx, transport, NegotiationRole::Initiator)
                .await?
            {
                UpgradeOutcome::Upgraded(next) => {
                    upgrades += 1;
                    transport = next;
                }
                UpgradeOutcome::Terminal(done) => {
                    return Ok(EstablishedTransport {
                        transport: done,
                        upgrades,
                    });
                }
                UpgradeOutcome::Rejected { transport, reason } => {
                    transport.abort();
                    return Err(reason);
                }
            }
        }

        transport.abort();
        Err(chain_exhausted())
    }
}

/// 单步头部交换：写出、读回、比对相等。
async fn exchange_header(
    ctx: &CallContext,
    transport: &dyn Transport,
    header: amqp_core::header::ProtocolHeader,
) -> Result<(), AmqpError> {
    write_header(ctx, transport, header).await?;
    let reply = read_header(ctx, transport).await?;
    if reply != header {
        return Err(version_mismatch(header, reply));
    }
    Ok(())
}
