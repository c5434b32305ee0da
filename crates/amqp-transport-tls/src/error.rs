use amqp_core::completion::GateRejection;
use amqp_core::error::{AmqpError, ErrorCategory, RetryAdvice};
use rustls::{AlertDescription, Error as RustlsError};
use std::borrow::Cow;
use std::io;
use std::time::Duration;

/// 描述一次 TLS 操作的错误码及默认文案。
#[derive(Clone, Copy)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const HANDSHAKE: OperationKind = OperationKind {
    code: "amqp.transport.tls.handshake_failed",
    message: "tls handshake",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "amqp.transport.tls.read_failed",
    message: "tls read",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "amqp.transport.tls.write_failed",
    message: "tls write",
};
pub(crate) const FLUSH: OperationKind = OperationKind {
    code: "amqp.transport.tls.flush_failed",
    message: "tls flush",
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "amqp.transport.tls.shutdown_failed",
    message: "tls shutdown",
};
pub(crate) const DISSOLVE: OperationKind = OperationKind {
    code: "amqp.transport.tls.dissolve_failed",
    message: "tls dissolve",
};

const CANCEL_CODE: &str = "amqp.transport.tls.cancelled";
const TIMEOUT_CODE: &str = "amqp.transport.tls.timeout";
const IN_FLIGHT_CODE: &str = "amqp.transport.tls.operation_in_flight";
const DISPOSED_CODE: &str = "amqp.transport.tls.disposed";

/// 将握手阶段的 `io::Error` 映射为框架级错误。
///
/// 握手失败大多嵌套 `rustls::Error`；证书与记录完整性问题归入
/// `Security`，瞬时故障归入 `Retryable`。
pub(crate) fn map_handshake_error(kind: OperationKind, error: io::Error) -> AmqpError {
    let category = categorize_with_rustls(&error);
    AmqpError::new(
        kind.code,
        Cow::Owned(format!("{}: {}", kind.message, error)),
    )
    .with_category(category)
    .with_cause(error)
}

/// 将读写阶段的 `io::Error` 映射为框架级错误。
pub(crate) fn map_stream_error(kind: OperationKind, error: io::Error) -> AmqpError {
    map_handshake_error(kind, error)
}

/// 构造取消错误，与 TCP 层保持一致语义。
pub(crate) fn cancelled_error(kind: OperationKind) -> AmqpError {
    AmqpError::new(CANCEL_CODE, format!("{} cancelled", kind.message))
        .with_category(ErrorCategory::Cancelled)
}

/// 构造超时错误。
pub(crate) fn timeout_error(kind: OperationKind) -> AmqpError {
    AmqpError::new(TIMEOUT_CODE, format!("{} timed out", kind.message))
        .with_category(ErrorCategory::Timeout)
}

/// 将方向闸门的拒绝映射为契约误用错误。
pub(crate) fn gate_error(kind: OperationKind, rejection: GateRejection) -> AmqpError {
    match rejection {
        GateRejection::AlreadyInFlight => AmqpError::new(
            IN_FLIGHT_CODE,
            format!("{}: another operation is in flight on this direction", kind.message),
        )
        .with_category(ErrorCategory::Misuse),
        GateRejection::Disposed => AmqpError::new(
            DISPOSED_CODE,
            format!("{}: transport already closed", kind.message),
        )
        .with_category(ErrorCategory::Misuse),
    }
}

/// 拆解通道需要独占所有权但通道仍被共享持有时返回的错误。
pub(crate) fn exclusive_channel_error() -> AmqpError {
    AmqpError::new(
        "amqp.transport.tls.channel_not_exclusive",
        "dissolving a tls channel requires exclusive ownership",
    )
    .with_category(ErrorCategory::Misuse)
}

fn categorize_with_rustls(error: &io::Error) -> ErrorCategory {
    if let Some(source) = error.get_ref()
        && let Some(rustls_error) = source.downcast_ref::<RustlsError>()
    {
        return categorize_rustls_error(rustls_error);
    }
    categorize_io_error(error)
}

fn categorize_rustls_error(error: &RustlsError) -> ErrorCategory {
    use RustlsError::*;
    match error {
        InappropriateMessage { .. }
        | InappropriateHandshakeMessage { .. }
        | InvalidMessage(_)
        | PeerMisbehaved(_)
        | DecryptError
        | EncryptError
        | PeerSentOversizedRecord
        | NoCertificatesPresented
        | InvalidCertificate(_)
        | InvalidCertRevocationList(_)
        | UnsupportedNameType
        | NoApplicationProtocol => ErrorCategory::Security,
        AlertReceived(alert) => alert_to_category(alert),
        PeerIncompatible(_) | HandshakeNotComplete | General(_) | Other(_) => {
            retryable(Duration::from_millis(80))
        }
        _ => retryable(Duration::from_millis(60)),
    }
}

fn alert_to_category(alert: &AlertDescription) -> ErrorCategory {
    use AlertDescription::*;
    match alert {
        CloseNotify | UserCanceled | NoRenegotiation => retryable(Duration::from_millis(30)),
        _ => ErrorCategory::Security,
    }
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted => retryable(Duration::from_millis(5)),
        ErrorKind::TimedOut | ErrorKind::UnexpectedEof => retryable(Duration::from_millis(40)),
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionRefused
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe => retryable(Duration::from_millis(60)),
        ErrorKind::OutOfMemory => ErrorCategory::Fatal,
        _ => ErrorCategory::NonRetryable,
    }
}

fn retryable(wait: Duration) -> ErrorCategory {
    ErrorCategory::Retryable(RetryAdvice::after(wait))
}
