//! 常用类型的统一导入口，供实现 crate 以 `use amqp_core::prelude::*;` 引入。

pub use crate::completion::{
    CloseGate, CompletionGate, CompletionMode, DetachOutcome, DirectionGate, DirectionPermit,
    GateRejection,
};
pub use crate::contract::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use crate::error::{AmqpError, ErrorCategory, ErrorCause, Result, RetryAdvice};
pub use crate::header::{
    PROTOCOL_HEADER_SIZE, PROTOCOL_MAGIC, ProtocolHeader, ProtocolId, ProtocolVersion,
};
pub use crate::time::MonotonicTimePoint;
#[cfg(feature = "std")]
pub use crate::time::{deadline_as_instant, deadline_expired, deadline_remaining, monotonic_now};
