use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_core::header::{ProtocolId, ProtocolVersion};
use amqp_transport::{BoxTransport, NegotiationRole, ProtocolProvider, UpgradeOutcome};
use async_trait::async_trait;

static SUPPORTED_VERSIONS: [ProtocolVersion; 1] = [ProtocolVersion::V1_0_0];

/// 终端 Provider：协议号 `amqp` 标记协商完成，传输层原样交付。
///
/// # 契约说明（What）
/// - `is_terminal` 恒为 `true`：发起端遇到它跳过头部交换直接完成，
///   监听端遇到它进入准入检查并把连接上交；
/// - `upgrade` 不做任何包装，返回 [`UpgradeOutcome::Terminal`]。
#[derive(Clone, Copy, Debug, Default)]
pub struct AmqpProvider;

impl AmqpProvider {
    /// 构造终端 Provider。
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProtocolProvider for AmqpProvider {
    fn protocol_id(&self) -> ProtocolId {
        ProtocolId::Amqp
    }

    fn supported_versions(&self) -> &[ProtocolVersion] {
        &SUPPORTED_VERSIONS
    }

    fn default_version(&self) -> ProtocolVersion {
        ProtocolVersion::V1_0_0
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn upgrade(
        &self,
        _ctx: &CallContext,
        transport: BoxTransport,
        _role: NegotiationRole,
    ) -> Result<UpgradeOutcome, AmqpError> {
        Ok(UpgradeOutcome::Terminal(transport))
    }
}
