use crate::{acceptor::TlsAcceptor, connector::TlsConnector};
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_core::header::{ProtocolId, ProtocolVersion};
use amqp_transport::{BoxTransport, NegotiationRole, ProtocolProvider, Transport, UpgradeOutcome};
use async_trait::async_trait;

static SUPPORTED_VERSIONS: [ProtocolVersion; 1] = [ProtocolVersion::V1_0_0];

/// TLS 升级 Provider：把协议号 `tls` 映射为一次安全分层包装。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将"协议头匹配成功之后怎样把连接变成加密连接"的知识收敛于此，
///   协商引擎对 rustls 与握手方向一无所知；
/// - 同一 Provider 实例可同时服务发起端与监听端（双端部署常见），
///   也可只配置单侧，未配置的角色在升级时以配置错误拒绝。
///
/// ## 契约（What）
/// - `protocol_id`：恒为 [`ProtocolId::Tls`]；非终端；
/// - `upgrade`：拆解入参传输层为原始字节流，按角色执行客户端或服务端
///   握手，成功返回 `Upgraded`；
/// - 握手失败时入参字节流随 Drop 释放，错误上抛由引擎记账。
#[derive(Clone, Debug)]
pub struct TlsProvider {
    connector: Option<TlsConnector>,
    acceptor: Option<TlsAcceptor>,
}

impl TlsProvider {
    /// 仅服务发起端的 Provider。
    pub fn for_initiator(connector: TlsConnector) -> Self {
        Self {
            connector: Some(connector),
            acceptor: None,
        }
    }

    /// 仅服务监听端的 Provider。
    pub fn for_listener(acceptor: TlsAcceptor) -> Self {
        Self {
            connector: None,
            acceptor: Some(acceptor),
        }
    }

    /// 双端部署：同一实例同时服务两个角色。
    pub fn for_both(connector: TlsConnector, acceptor: TlsAcceptor) -> Self {
        Self {
            connector: Some(connector),
            acceptor: Some(acceptor),
        }
    }
}

fn role_not_configured(role: &'static str) -> AmqpError {
    AmqpError::new(
        "amqp.transport.tls.role_not_configured",
        format!("tls provider has no {role} configuration"),
    )
}

#[async_trait]
impl ProtocolProvider for TlsProvider {
    fn protocol_id(&self) -> ProtocolId {
        ProtocolId::Tls
    }

    fn supported_versions(&self) -> &[ProtocolVersion] {
        &SUPPORTED_VERSIONS
    }

    fn default_version(&self) -> ProtocolVersion {
        ProtocolVersion::V1_0_0
    }

    async fn upgrade(
        &self,
        ctx: &CallContext,
        transport: BoxTransport,
        role: NegotiationRole,
    ) -> Result<UpgradeOutcome, AmqpError> {
        let parts = transport.into_io()?;
        let channel = match role {
            NegotiationRole::Initiator => {
                let connector = self
                    .connector
                    .as_ref()
                    .ok_or_else(|| role_not_configured("initiator"))?;
                connector.connect(ctx, parts).await?
            }
            NegotiationRole::Listener => {
                let acceptor = self
                    .acceptor
                    .as_ref()
                    .ok_or_else(|| role_not_configured("listener"))?;
                acceptor.accept(ctx, parts).await?
            }
        };
        Ok(UpgradeOutcome::Upgraded(channel.boxed()))
    }
}
