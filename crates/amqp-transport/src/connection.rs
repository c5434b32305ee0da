use crate::addr::TransportSocketAddr;
use crate::security::TransportSecurity;
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use async_trait::async_trait;
use bytes::{BufMut, Bytes};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// 可被安全分层递归包装的原始字节流。
///
/// 所有满足 Tokio 读写契约的流自动实现该 trait；Provider 对流的包装
/// 不关心其下是裸 TCP 还是另一层加密流。
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static {}

/// 装箱的字节流，Provider 链在层与层之间传递的最小载体。
pub type BoxIo = Box<dyn ByteStream>;

/// 传输层拆解结果：原始字节流加上随层迁移的元数据。
///
/// # 契约说明（What）
/// - `io`：该层让渡的独占字节流；
/// - `local_addr`/`peer_addr`：底层连接的地址信息，升级后的新层原样继承；
/// - `security`：拆解时已经生效的安全属性（例如 TLS 之上再升级时保留
///   已认证的对端身份）。
pub struct TransportIo {
    /// 独占的原始字节流。
    pub io: BoxIo,
    /// 本地地址。
    pub local_addr: Option<TransportSocketAddr>,
    /// 对端地址。
    pub peer_addr: Option<TransportSocketAddr>,
    /// 拆解时的安全属性。
    pub security: TransportSecurity,
}

impl fmt::Debug for TransportIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportIo")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

/// 统一的传输能力契约：原始与组合（升级后）的传输层实现同一接口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 协商引擎、准入策略与更高协议层只面向该 trait 编程；TCP 与 TLS
///   乃至外部扩展的安全分层在运行期自由替换；
/// - 以 `async_trait` 保持对象安全：Provider 链必须能以
///   `Box<dyn Transport>` 在层与层之间移交所有权。
///
/// ## 契约（What）
/// - `read`：至多读取一次底层数据并写入 `buf`，返回 0 表示对端有序关闭；
/// - `write`：提交一组非连续缓冲，实现可合并后落盘；同方向的完成顺序
///   与提交顺序一致；
/// - `flush`：排空实现内部的待写数据；
/// - `shutdown`：优雅关闭，幂等——重复调用为空操作；
/// - `abort`：立即关闭，不等待在途操作，同样幂等；
/// - `into_io`：独占拆解为原始字节流供 Provider 包装；若该层仍被共享
///   持有，以资源类错误拒绝；
/// - **并发约束**：每方向至多一个在途操作；读写之间互不阻塞。
///
/// ## 风险提示（Trade-offs）
/// - `into_io` 消耗层对象并放弃其可复用状态（读缓存、池化段等），
///   这些状态在拆解时归还而不是迁移；升级后的流量特征由新层重新度量。
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// 协议标识（例如 `"tcp"`、`"tls"`）。
    fn scheme(&self) -> &'static str;

    /// 本地地址。
    fn local_addr(&self) -> Option<TransportSocketAddr>;

    /// 对端地址。
    fn peer_addr(&self) -> Option<TransportSocketAddr>;

    /// 当前安全属性。
    fn security(&self) -> TransportSecurity;

    /// 读取数据写入 `buf`，返回读取的字节数；0 表示对端有序关闭。
    async fn read(
        &self,
        ctx: &CallContext,
        buf: &mut (dyn BufMut + Send),
    ) -> Result<usize, AmqpError>;

    /// 写入一组缓冲，返回写入的总字节数。
    async fn write(&self, ctx: &CallContext, bufs: &[Bytes]) -> Result<usize, AmqpError>;

    /// 排空内部待写数据。
    async fn flush(&self, ctx: &CallContext) -> Result<(), AmqpError>;

    /// 优雅关闭，重复调用为空操作。
    async fn shutdown(&self, ctx: &CallContext) -> Result<(), AmqpError>;

    /// 立即关闭，不等待在途操作，幂等。
    fn abort(&self);

    /// 独占拆解为原始字节流与元数据。
    fn into_io(self: Box<Self>) -> Result<TransportIo, AmqpError>;
}

/// 装箱的传输层，Provider 链的统一交换单位。
pub type BoxTransport = Box<dyn Transport>;
