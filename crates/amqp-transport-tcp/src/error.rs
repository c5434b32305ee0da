use amqp_core::completion::GateRejection;
use amqp_core::error::{AmqpError, ErrorCategory, RetryAdvice};
use std::borrow::Cow;
use std::io;
use std::time::Duration;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const BIND: OperationKind = OperationKind {
    code: "amqp.transport.tcp.bind_failed",
    message: "tcp bind",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "amqp.transport.tcp.accept_failed",
    message: "tcp accept",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "amqp.transport.tcp.connect_failed",
    message: "tcp connect",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "amqp.transport.tcp.read_failed",
    message: "tcp read",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "amqp.transport.tcp.write_failed",
    message: "tcp write",
};
pub(crate) const FLUSH: OperationKind = OperationKind {
    code: "amqp.transport.tcp.flush_failed",
    message: "tcp flush",
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "amqp.transport.tcp.shutdown_failed",
    message: "tcp shutdown",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "amqp.transport.tcp.configure_failed",
    message: "tcp configure",
};
pub(crate) const DISSOLVE: OperationKind = OperationKind {
    code: "amqp.transport.tcp.dissolve_failed",
    message: "tcp dissolve",
};

const CANCEL_CODE: &str = "amqp.transport.tcp.cancelled";
const TIMEOUT_CODE: &str = "amqp.transport.tcp.timeout";
const IN_FLIGHT_CODE: &str = "amqp.transport.tcp.operation_in_flight";
const DISPOSED_CODE: &str = "amqp.transport.tcp.disposed";

/// 将 IO 错误映射为框架级错误，并附带分类。
pub(crate) fn map_io_error(kind: OperationKind, error: io::Error) -> AmqpError {
    let category = categorize_io_error(&error);
    AmqpError::new(
        kind.code,
        Cow::Owned(format!("{}: {}", kind.message, error)),
    )
    .with_category(category)
    .with_cause(error)
}

/// 构造取消错误。
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
        "amqp.transport.tcp.channel_not_exclusive",
        "dissolving a tcp channel requires exclusive ownership",
    )
    .with_category(ErrorCategory::Misuse)
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::WouldBlock | ErrorKind::Interrupted => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(5)))
        }
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::AddrInUse
        | ErrorKind::AddrNotAvailable
        | ErrorKind::BrokenPipe => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(50)))
        }
        ErrorKind::PermissionDenied | ErrorKind::Unsupported => ErrorCategory::NonRetryable,
        ErrorKind::WriteZero => {
            ErrorCategory::Retryable(RetryAdvice::after(Duration::from_millis(10)))
        }
        ErrorKind::OutOfMemory => ErrorCategory::Fatal,
        _ => ErrorCategory::NonRetryable,
    }
}
