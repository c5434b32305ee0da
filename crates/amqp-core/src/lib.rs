#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "amqp-core: AMQP 1.0 传输协商内核的核心契约层。"]
#![doc = ""]
#![doc = "== 职责边界 =="]
#![doc = "- **错误模型**：稳定错误码 + 分类 + 根因链，所有实现 crate 共用一个错误出口；"]
#![doc = "- **调用上下文**：取消令牌与绝对截止时间，贯穿建连、协商与读写全程；"]
#![doc = "- **完成语义**：恰好一次完成、幂等关闭、每方向至多一个在途操作的原子原语；"]
#![doc = "- **协议头编解码**：8 字节协商头的唯一实现，其余线上字节对本内核不透明。"]
#![doc = ""]
#![doc = "== 内存分配依赖 =="]
#![doc = "本 crate 定位于 `no_std + alloc`：错误文案与根因链依赖 `Cow`/`Arc`。"]
#![doc = "`std` Feature（默认开启）追加单调时钟来源，供各传输实现换算截止时间。"]

extern crate alloc;

pub mod completion;
pub mod contract;
pub mod error;
pub mod header;
pub mod prelude;
pub mod time;

pub use completion::{CloseGate, CompletionGate, CompletionMode, DetachOutcome, DirectionGate};
pub use contract::{CallContext, Cancellation, Deadline};
pub use error::{AmqpError, ErrorCategory, Result, RetryAdvice};
pub use header::{ProtocolHeader, ProtocolId, ProtocolVersion};
pub use time::MonotonicTimePoint;
