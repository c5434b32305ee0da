use std::sync::Arc;

use arc_swap::ArcSwap;
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor as TokioTlsAcceptor;

use crate::{
    channel::TlsChannel,
    error::{self, map_handshake_error},
    util::run_with_context,
};
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_transport::{PeerIdentity, TransportIo, TransportSecurity};

/// TLS 服务端握手入口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 在监听端接受并拆解基座传输后，执行 TLS 握手并生成 [`TlsChannel`]；
/// - 通过 [`ArcSwap`] 支持证书热更新：替换配置不中断既有连接，新握手
///   立即读取最新快照；
/// - 双向认证开启时提取对端叶子证书，作为身份附着到通道，供准入
///   策略在协商收尾时检查。
///
/// ## 逻辑（How）
/// 1. 读取当前配置快照并构造 `tokio_rustls::TlsAcceptor`；
/// 2. 经 `run_with_context` 注入取消/截止语义执行异步握手；
/// 3. 按双向认证开关提取 `peer_certificates` 的首张证书为 [`PeerIdentity`]；
/// 4. 以握手产物与继承的地址元数据组装 [`TlsChannel`]。
///
/// ## 契约（What）
/// - `accept`：成功返回可读写的 [`TlsChannel`]；失败返回结构化错误，
///   入参字节流随 Drop 释放；
/// - `replace_config`：原子替换配置，仅影响后续握手；
/// - **前置条件**：`config` 的证书链与私钥已完成装配。
///
/// ## 风险与权衡（Trade-offs）
/// - 高频热更会短暂同时持有多份配置，内存峰值与握手并发度相关；
/// - 轮询式取消存在毫秒级延迟，换取实现的简单性。
#[derive(Clone, Debug)]
pub struct TlsAcceptor {
    config: Arc<ArcSwap<ServerConfig>>,
    mutual_auth: bool,
}

impl TlsAcceptor {
    /// 使用初始配置创建握手器。
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config: Arc::new(ArcSwap::new(config)),
            mutual_auth: false,
        }
    }

    /// 声明已请求双向认证：握手成功后提取对端身份。
    pub fn with_mutual_auth(mut self, mutual_auth: bool) -> Self {
        self.mutual_auth = mutual_auth;
        self
    }

    /// 原子替换 TLS 配置，通常用于证书轮换。
    pub fn replace_config(&self, config: Arc<ServerConfig>) {
        self.config.store(config);
    }

    /// 获取当前配置快照。
    pub fn config_snapshot(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    /// 对一条已拆解的连接执行服务端握手。
    pub async fn accept(
        &self,
        ctx: &CallContext,
        parts: TransportIo,
    ) -> Result<TlsChannel, AmqpError> {
        let acceptor = TokioTlsAcceptor::from(self.config.load_full());
        let stream = run_with_context(
            ctx,
            error::HANDSHAKE,
            acceptor.accept(parts.io),
            map_handshake_error,
        )
        .await?;

        let peer_identity = if self.mutual_auth {
            let (_, connection) = stream.get_ref();
            connection
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(|cert| PeerIdentity::from_certificate_der(cert.as_ref().to_vec()))
        } else {
            None
        };
        Ok(TlsChannel::new(
            stream.into(),
            parts.local_addr,
            parts.peer_addr,
            TransportSecurity::Tls { peer_identity },
        ))
    }
}
