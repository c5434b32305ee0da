use amqp_core::error::{AmqpError, ErrorCategory};
use amqp_core::header::{ProtocolHeader, ProtocolId, ProtocolVersion};

/// 对端回显的协议头与发送值不一致。终态，不自动以对端版本重试。
pub(crate) fn version_mismatch(sent: ProtocolHeader, received: ProtocolHeader) -> AmqpError {
    AmqpError::new(
        "amqp.negotiation.version_mismatch",
        format!("peer answered {received} to {sent}"),
    )
    .with_category(ErrorCategory::Negotiation)
}

/// 对端请求了未配置的协议。
pub(crate) fn unsupported_protocol(id: ProtocolId) -> AmqpError {
    AmqpError::new(
        "amqp.negotiation.unsupported_protocol",
        format!("no provider configured for protocol {id}"),
    )
    .with_category(ErrorCategory::Negotiation)
}

/// 对端请求了 Provider 不支持的版本。
pub(crate) fn unsupported_version(id: ProtocolId, version: ProtocolVersion) -> AmqpError {
    AmqpError::new(
        "amqp.negotiation.unsupported_version",
        format!("protocol {id} does not support version {version}"),
    )
    .with_category(ErrorCategory::Negotiation)
}

/// 准入策略拒绝了未达到安全要求的终端连接。
pub(crate) fn admission_denied(detail: &'static str) -> AmqpError {
    AmqpError::new("amqp.negotiation.admission_denied", detail)
        .with_category(ErrorCategory::Security)
}

/// 对端在协商完成前关闭了连接。
pub(crate) fn peer_closed() -> AmqpError {
    AmqpError::new(
        "amqp.negotiation.peer_closed",
        "peer closed the connection before negotiation completed",
    )
}

/// 升级链在未到达终端协议前耗尽。
pub(crate) fn chain_exhausted() -> AmqpError {
    AmqpError::new(
        "amqp.negotiation.chain_exhausted",
        "provider chain exhausted before reaching a terminal protocol",
    )
}
