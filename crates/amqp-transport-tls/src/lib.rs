#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# amqp-transport-tls

## 设计动机（Why）
- **安全分层**：为协商链提供 TLS 加密升级，链路机密性与完整性由
  `rustls` + `tokio-rustls` 保证；
- **可运维性**：显式的错误分类（`Security` / `Retryable` / `Timeout`）与
  双向认证身份附着，支撑准入策略与审计；
- **热更新**：接受器依托 `ArcSwap` 在不中断既有连接的情况下轮换证书。

## 核心契约（What）
- [`TlsConnector`] / [`TlsAcceptor`]：分别承担客户端与服务端握手，消费
  拆解后的原始字节流并产出 [`TlsChannel`]；
- [`TlsChannel`]：与基座传输同契约的加密通道；多缓冲写入先合并再加密，
  `close_notify` 恰好发送一次；
- [`TlsProvider`]：把协议号 `tls` 接入 Provider 链，内层字节流可递归
  再包装。

## 实现策略（How）
- 握手与读写经内部工具函数注入取消/截止语义；
- 错误按 `rustls::Error` 细分归类，证书与记录完整性问题归入安全类；
- 配置装配经 [`settings`] 模块集中完成，启动期错误独立建模。

## 风险与考量（Trade-offs）
- 轮询式取消存在毫秒级延迟；
- 当前只支持以配置注入的校验策略，不提供运行期回调换装。
"#]

mod acceptor;
mod channel;
mod connector;
mod error;
mod provider;
pub mod settings;
mod util;

pub use acceptor::TlsAcceptor;
pub use channel::TlsChannel;
pub use connector::TlsConnector;
pub use provider::TlsProvider;
pub use settings::{TlsConfigError, client_config, server_config};
