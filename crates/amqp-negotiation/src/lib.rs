#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# amqp-negotiation

## 设计动机（Why）
- **定位**：协议头协商引擎——发起端按 Provider 链驱动"建连 → 逐步
  升级"，监听端镜像升级循环直至终端协议；
- **架构角色**：位于传输实现之上、AMQP 帧层之下；上层拿到的是协商
  完毕、通过准入的终端传输层，连同已消费的协议头。

## 核心契约（What）
- [`TransportInitiator::connect`]：单一绝对截止时间覆盖全程；回显
  不匹配即终态失败，不以对端版本自动重试；失败路径保证最近打开的
  层已关闭；
- [`NegotiationListener`]：每条连接以"父级取消 + 固定握手超时"的
  独立上下文并发协商，处理器之间不共享可变状态；失败连接以告警
  丢弃，绝不影响监听器可用性；
- [`AdmissionPolicy`]：终端协议到达时的安全闸检，拒绝从未升级的
  明文连接或未认证的对端。

## 实现策略（How）
- 协议头的读取以 `limit` 约束空间，恰好消费 8 字节，后续载荷留在
  传输层缓存；
- Provider 链构建期校验（非空、无重复、含终端），运行期只读共享；
- 协商进度以 `tracing` 的 debug 级日志记录，失败以 warn 级记录。
"#]

mod admission;
mod amqp_provider;
mod error;
mod initiator;
mod listener;
mod wire;

pub use admission::AdmissionPolicy;
pub use amqp_provider::AmqpProvider;
pub use initiator::{EstablishedTransport, TransportInitiator};
pub use listener::{AcceptedConnection, ListenerSettings, NegotiationListener};
