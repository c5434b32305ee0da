use crate::error::admission_denied;
use amqp_core::error::AmqpError;
use amqp_core::header::{ProtocolHeader, ProtocolId};
use amqp_transport::{ProviderChain, TransportSecurity};

/// 准入策略：终端协议到达时对连接安全属性的最后检查。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 升级循环只保证"对端请求的升级被正确执行"，并不保证对端请求了
///   任何升级；要求加密或认证的部署必须在连接上交前做一次策略闸检，
///   否则从未升级的明文连接会穿透到业务层；
/// - 策略与机制分离：检查只读取 [`TransportSecurity`]，不关心加密由
///   哪个 Provider 在第几层实现。
///
/// ## 契约（What）
/// - `check`：满足策略返回 `Ok`，否则返回 `Security` 分类的终态错误；
/// - `required_header`：被拒绝时向对端回写的"应当先升级"提示头部，
///   无可提示项时为 `None`。
#[derive(Clone, Copy, Debug, Default)]
pub struct AdmissionPolicy {
    require_secure_transport: bool,
    require_peer_authentication: bool,
}

impl AdmissionPolicy {
    /// 不作任何要求的默认策略。
    pub fn new() -> Self {
        Self::default()
    }

    /// 要求链路加密：从未升级的明文终端连接将被拒绝。
    pub fn with_require_secure_transport(mut self, required: bool) -> Self {
        self.require_secure_transport = required;
        self
    }

    /// 要求对端通过双向认证并附着身份。
    pub fn with_require_peer_authentication(mut self, required: bool) -> Self {
        self.require_peer_authentication = required;
        self
    }

    /// 校验连接的安全属性是否满足策略。
    pub fn check(&self, security: &TransportSecurity) -> Result<(), AmqpError> {
        if self.require_secure_transport && !security.is_secure() {
            return Err(admission_denied(
                "policy requires a secure transport, connection was never upgraded",
            ));
        }
        if self.require_peer_authentication && security.peer_identity().is_none() {
            return Err(admission_denied(
                "policy requires an authenticated peer identity",
            ));
        }
        Ok(())
    }

    /// 拒绝时回写的提示头部：指向策略要求的升级协议。
    pub(crate) fn required_header(&self, chain: &ProviderChain) -> Option<ProtocolHeader> {
        if self.require_secure_transport || self.require_peer_authentication {
            chain
                .lookup(ProtocolId::Tls)
                .map(|provider| provider.default_header())
        } else {
            None
        }
    }
}
