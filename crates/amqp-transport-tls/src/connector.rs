use std::sync::Arc;

use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio_rustls::TlsConnector as TokioTlsConnector;

use crate::{
    channel::TlsChannel,
    error::{self, map_handshake_error},
    util::run_with_context,
};
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_transport::{PeerIdentity, TransportIo, TransportSecurity};

/// TLS 客户端握手入口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 发起端在协议头协商通过后，以本连接器在拆解出的字节流上执行客户端
///   握手，得到与服务端对称的 [`TlsChannel`]；
/// - 证书校验策略完全由注入的 [`ClientConfig`] 决定：系统根、固定根
///   或自定义校验回调都在配置装配阶段表达，本连接器不再叠加策略。
///
/// ## 契约（What）
/// - `connect`：成功返回已握手的 [`TlsChannel`]；失败返回结构化错误，
///   入参字节流随 Drop 释放；
/// - `server_name`：SNI 与证书主机名校验的目标名称，构造后不变；
/// - 双向认证开启时，握手成功后附着对端（服务端）身份。
#[derive(Clone, Debug)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    mutual_auth: bool,
}

impl TlsConnector {
    /// 以客户端配置与目标名称构造连接器。
    pub fn new(config: Arc<ClientConfig>, server_name: ServerName<'static>) -> Self {
        Self {
            config,
            server_name,
            mutual_auth: false,
        }
    }

    /// 声明已请求双向认证：握手成功后提取对端身份。
    pub fn with_mutual_auth(mut self, mutual_auth: bool) -> Self {
        self.mutual_auth = mutual_auth;
        self
    }

    /// 对一条已拆解的连接执行客户端握手。
    pub async fn connect(
        &self,
        ctx: &CallContext,
        parts: TransportIo,
    ) -> Result<TlsChannel, AmqpError> {
        let connector = TokioTlsConnector::from(Arc::clone(&self.config));
        let stream = run_with_context(
            ctx,
            error::HANDSHAKE,
            connector.connect(self.server_name.clone(), parts.io),
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
