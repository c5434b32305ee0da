#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "amqp-transport: 传输能力契约与协议升级 Provider 链的统一抽象层。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：让协商引擎与更高协议层面向同一套接口编程，TCP/TLS 及外部扩展的安全分层可热插拔替换；"]
#![doc = "- **What**：定义 [`Transport`] 能力契约、[`ProtocolProvider`] 工厂契约、[`ProviderChain`] 升级序列，以及地址与安全元数据；"]
#![doc = "- **How**：以 `async_trait` 保持对象安全，层与层之间通过 `Box<dyn Transport>` 移交所有权，升级以 [`TransportIo`] 拆解出可递归包装的字节流。"]

pub mod addr;
pub mod connection;
pub mod io;
pub mod provider;
pub mod security;

pub use addr::TransportSocketAddr;
pub use connection::{BoxIo, BoxTransport, ByteStream, Transport, TransportIo};
pub use io::PrefixedIo;
pub use provider::{
    NegotiationRole, ProtocolProvider, ProviderChain, ProviderChainBuilder, UpgradeOutcome,
};
pub use security::{PeerIdentity, TransportSecurity};
