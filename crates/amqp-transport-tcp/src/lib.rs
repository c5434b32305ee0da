#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# amqp-transport-tcp

## 设计动机（Why）
- **定位**：在 Tokio 运行时上实现能力契约的 TCP 层，封装建连、监听、
  全双工读写与自适应缓冲的全部细节；
- **架构角色**：协商链的基座传输——发起端由它建立首个字节流，监听端
  由它接受连接；TLS 等安全分层经 `try_into_io` 拆解出的原始流向上包装；
- **设计理念**：所有网络操作感知 [`CallContext`](amqp_core::contract::CallContext)
  的取消与截止，失败映射为携带稳定错误码的
  [`AmqpError`](amqp_core::error::AmqpError)。

## 核心契约（What）
- **并发纪律**：读写互不阻塞，同方向至多一个在途操作，违者以 `Misuse`
  分类拒绝；
- **缓冲纪律**：空闲档位以池化小段承接读取，活跃/繁忙档位换用可增长
  缓冲并同步调整内核套接字缓冲；逻辑读优先消费缓冲余量，命中即免去
  系统调用；
- **关闭纪律**：优雅关闭与立即中止均幂等，池化段在关闭路径恰好归还一次。

## 实现策略（How）
- 连接拆分为独立读写半部，各自以 `tokio::sync::Mutex` 承载可复用状态；
- 取消/截止经 `tokio::select!` 的 biased 组合注入每次 IO；
- 中止路径持有套接字的复制句柄，同步切断数据流而不等待半部锁。

## 风险与考量（Trade-offs）
- 取消响应依赖定时轮询，存在毫秒级延迟；
- 内核缓冲调整失败仅告警，通道以旧缓冲继续运行。
"#]

mod adaptive;
mod channel;
mod error;
mod listener;
mod settings;
mod util;

pub use channel::TcpChannel;
pub use listener::TcpListener;
pub use settings::{ACTIVE_BUFFER_SIZE, BUSY_BUFFER_SIZE, TcpSettings};
