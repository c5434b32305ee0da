use crate::{
    error::{self, exclusive_channel_error, gate_error, map_stream_error},
    util::run_with_context,
};
use amqp_core::completion::{CloseGate, DirectionGate};
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_transport::{
    BoxIo, BoxTransport, Transport, TransportIo, TransportSecurity, TransportSocketAddr,
};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf, split},
    sync::Mutex as AsyncMutex,
};
use tokio_rustls::TlsStream;

#[derive(Debug)]
struct TlsWriteState {
    half: WriteHalf<TlsStream<BoxIo>>,
    merge: BytesMut,
}

#[derive(Debug)]
struct TlsChannelInner {
    read: AsyncMutex<ReadHalf<TlsStream<BoxIo>>>,
    write: AsyncMutex<TlsWriteState>,
    read_gate: DirectionGate,
    write_gate: DirectionGate,
    close_gate: CloseGate,
    local_addr: Option<TransportSocketAddr>,
    peer_addr: Option<TransportSocketAddr>,
    security: TransportSecurity,
}

/// TLS 通道：握手完成后的加密字节流，满足与基座传输相同的能力契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为上层提供与 [`TcpChannel`](amqp_transport_tcp) 一致的读写语义，
///   加解密细节被完全封装；协商引擎与准入策略只通过 `security()`
///   感知链路差异；
/// - 内层字节流以 [`BoxIo`] 抽象，TLS 之上可以再叠加升级，TLS 之下
///   可以是裸 TCP 或另一层安全流。
///
/// ## 逻辑（How）
/// - 握手后的流以 `tokio::io::split` 拆为读写半部，各自由
///   `tokio::sync::Mutex` 承载，读写互不阻塞；
/// - 写路径在提交多个缓冲时先拼接为连续内存再提交加密，避免逐段
///   产生 TLS 记录；
/// - `shutdown` 经 [`CloseGate`] 保证 `close_notify` 恰好发送一次，
///   内层流的关闭由本层负责传导。
///
/// ## 契约（What）
/// - `security()`：恒为 `Tls`，双向认证通过时携带对端身份；
/// - `read` 返回 0 表示对端有序关闭加密通道；
/// - `into_io`：独占拆解为 `TlsStream`，供更外层 Provider 继续包装，
///   安全属性随之迁移。
#[derive(Clone, Debug)]
pub struct TlsChannel {
    inner: Arc<TlsChannelInner>,
}

impl TlsChannel {
    pub(crate) fn new(
        stream: TlsStream<BoxIo>,
        local_addr: Option<TransportSocketAddr>,
        peer_addr: Option<TransportSocketAddr>,
        security: TransportSecurity,
    ) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            inner: Arc::new(TlsChannelInner {
                read: AsyncMutex::new(read_half),
                write: AsyncMutex::new(TlsWriteState {
                    half: write_half,
                    merge: BytesMut::new(),
                }),
                read_gate: DirectionGate::new(),
                write_gate: DirectionGate::new(),
                close_gate: CloseGate::new(),
                local_addr,
                peer_addr,
                security,
            }),
        }
    }

    /// 读取解密后的数据写入 `buf`。
    pub async fn read(
        &self,
        ctx: &CallContext,
        mut buf: &mut (dyn BufMut + Send),
    ) -> Result<usize, AmqpError> {
        let _permit = self
            .inner
            .read_gate
            .begin()
            .map_err(|rejection| gate_error(error::READ, rejection))?;
        let mut half = self.inner.read.lock().await;
        run_with_context(
            ctx,
            error::READ,
            half.read_buf(&mut buf),
            map_stream_error,
        )
        .await
    }

    /// 写入一组缓冲；多缓冲先合并为连续内存再交付加密。
    pub async fn write(&self, ctx: &CallContext, bufs: &[Bytes]) -> Result<usize, AmqpError> {
        let _permit = self
            .inner
            .write_gate
            .begin()
            .map_err(|rejection| gate_error(error::WRITE, rejection))?;
        let mut guard = self.inner.write.lock().await;
        let state = &mut *guard;

        let total: usize = bufs.iter().map(Bytes::len).sum();
        if total == 0 {
            return Ok(0);
        }

        if bufs.len() > 1 {
            state.merge.clear();
            state.merge.reserve(total);
            for buf in bufs {
                state.merge.extend_from_slice(buf);
            }
            let TlsWriteState { half, merge } = &mut *state;
            run_with_context(ctx, error::WRITE, half.write_all(&merge[..]), map_stream_error)
                .await?;
            merge.clear();
        } else {
            run_with_context(
                ctx,
                error::WRITE,
                state.half.write_all(&bufs[0]),
                map_stream_error,
            )
            .await?;
        }
        Ok(total)
    }

    /// 排空加密层的待写记录。
    pub async fn flush(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        let _permit = self
            .inner
            .write_gate
            .begin()
            .map_err(|rejection| gate_error(error::FLUSH, rejection))?;
        let mut guard = self.inner.write.lock().await;
        run_with_context(ctx, error::FLUSH, guard.half.flush(), map_stream_error).await
    }

    /// 优雅关闭：发送 `close_notify` 并传导内层关闭，恰好一次。
    pub async fn shutdown(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        if !self.inner.close_gate.begin_close() {
            return Ok(());
        }
        self.inner.read_gate.dispose();
        self.inner.write_gate.dispose();
        let mut guard = self.inner.write.lock().await;
        run_with_context(ctx, error::SHUTDOWN, guard.half.shutdown(), map_stream_error).await
    }

    /// 立即关闭：拒绝后续操作，并在运行时可用时异步传导内层关闭。
    pub fn abort(&self) {
        let first = self.inner.close_gate.begin_close();
        self.inner.read_gate.dispose();
        self.inner.write_gate.dispose();
        if first && let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move {
                let mut guard = inner.write.lock().await;
                let _ = guard.half.shutdown().await;
            });
        }
    }

    /// 独占拆解为加密流与元数据，安全属性随层迁移。
    pub fn try_into_io(self) -> Result<TransportIo, AmqpError> {
        if self.inner.close_gate.is_closed() {
            return Err(gate_error(
                error::DISSOLVE,
                amqp_core::completion::GateRejection::Disposed,
            ));
        }
        let inner = Arc::try_unwrap(self.inner).map_err(|_| exclusive_channel_error())?;
        let read_half = inner.read.into_inner();
        let TlsWriteState { half, .. } = inner.write.into_inner();
        let stream = read_half.unsplit(half);
        Ok(TransportIo {
            io: Box::new(stream),
            local_addr: inner.local_addr,
            peer_addr: inner.peer_addr,
            security: inner.security,
        })
    }

    /// 装箱为统一的传输能力对象。
    pub fn boxed(self) -> BoxTransport {
        Box::new(self)
    }
}

#[async_trait]
impl Transport for TlsChannel {
    fn scheme(&self) -> &'static str {
        "tls"
    }

    fn local_addr(&self) -> Option<TransportSocketAddr> {
        self.inner.local_addr
    }

    fn peer_addr(&self) -> Option<TransportSocketAddr> {
        self.inner.peer_addr
    }

    fn security(&self) -> TransportSecurity {
        self.inner.security.clone()
    }

    async fn read(
        &self,
        ctx: &CallContext,
        buf: &mut (dyn BufMut + Send),
    ) -> Result<usize, AmqpError> {
        TlsChannel::read(self, ctx, buf).await
    }

    async fn write(&self, ctx: &CallContext, bufs: &[Bytes]) -> Result<usize, AmqpError> {
        TlsChannel::write(self, ctx, bufs).await
    }

    async fn flush(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        TlsChannel::flush(self, ctx).await
    }

    async fn shutdown(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        TlsChannel::shutdown(self, ctx).await
    }

    fn abort(&self) {
        TlsChannel::abort(self);
    }

    fn into_io(self: Box<Self>) -> Result<TransportIo, AmqpError> {
        (*self).try_into_io()
    }
}
