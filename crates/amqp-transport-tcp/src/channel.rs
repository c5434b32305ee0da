use crate::{
    adaptive::AdaptiveIo,
    error::{self, exclusive_channel_error, gate_error, map_io_error},
    settings::TcpSettings,
    util::run_with_context,
};
use amqp_buffer::{BufferLevel, BufferSizeTracker, PooledSegment};
use amqp_core::completion::{CloseGate, DirectionGate};
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_core::time::monotonic_now;
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use socket2::SockRef;
use std::io::IoSlice;
use std::net::Shutdown as StdShutdown;
use std::sync::Arc;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream as TokioTcpStream,
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::Mutex as AsyncMutex,
};

use amqp_transport::{
    BoxTransport, PrefixedIo, Transport, TransportIo, TransportSecurity, TransportSocketAddr,
};

/// 读方向的缓冲形态，随档位切换。
#[derive(Debug)]
enum ReadBuffer {
    /// 空闲档位：复用池化小段，避免心跳级读取的反复分配。
    Pooled(PooledSegment),
    /// 活跃/繁忙档位：可增长缓冲，承接套接字的实际读取量。
    Growable(BytesMut),
}

impl ReadBuffer {
    fn remaining(&self) -> usize {
        match self {
            ReadBuffer::Pooled(segment) => segment.remaining(),
            ReadBuffer::Growable(buffer) => buffer.len(),
        }
    }
}

#[derive(Debug)]
struct ReadState {
    half: OwnedReadHalf,
    tracker: BufferSizeTracker,
    buffer: ReadBuffer,
}

#[derive(Debug)]
struct WriteState {
    half: OwnedWriteHalf,
    tracker: BufferSizeTracker,
    merge: BytesMut,
}

#[derive(Debug)]
struct TcpChannelInner {
    read: AsyncMutex<ReadState>,
    write: AsyncMutex<WriteState>,
    read_gate: DirectionGate,
    write_gate: DirectionGate,
    close_gate: CloseGate,
    local_addr: TransportSocketAddr,
    peer_addr: TransportSocketAddr,
    settings: TcpSettings,
    /// 同一套接字的复制句柄：中止路径的同步关闭与缓冲调整都经它执行，
    /// 绕开可能被在途操作持有的半部锁。
    abort_handle: std::net::TcpStream,
}

/// TCP 通道：能力契约在 Tokio 套接字上的直接实现。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为协商引擎与上层协议栈提供全双工的字节流读写，同时贯彻
///   [`CallContext`] 的取消/截止语义与恰好一次的关闭纪律；
/// - 按流量强度自适应调整缓冲：空闲连接以池化小段承接心跳级读取，
///   活跃连接换用可增长缓冲并同步放大内核套接字缓冲。
///
/// ## 逻辑 (How)
/// - 连接拆分为独立的读/写半部，各以 `tokio::sync::Mutex` 承载可复用
///   方向状态；读与写互不阻塞，同方向由 [`DirectionGate`] 强制串行；
/// - 读路径先从缓冲余量服务（命中即短路，不触发系统调用），耗尽后
///   按当前档位发起套接字读取并缓存超出本次所需的字节；
/// - 写路径在多缓冲且总量不超过当前档位尺寸时合并为单次连续写出，
///   否则走 vectored 写循环；
/// - 每次操作向 [`BufferSizeTracker`] 记账，档位变化时经复制句柄调整
///   `SO_RCVBUF`/`SO_SNDBUF`，缓冲形态在该方向下一次空载时切换。
///
/// ## 契约 (What)
/// - `read` 返回 0 表示对端有序关闭；`write` 保证写完全部输入；
/// - `shutdown`/`abort` 幂等；关闭后的任何操作以 `Misuse` 分类拒绝；
/// - `into_io` 要求独占所有权，拆解时归还池化段。
///
/// ## 注意事项 (Trade-offs)
/// - 内核缓冲调整失败仅记录告警，不打断数据通路；
/// - 档位降回空闲后，旧的可增长缓冲在耗尽时整体释放，以池化段重新
///   开始，短暂牺牲容量换取空闲期的内存回落。
#[derive(Clone, Debug)]
pub struct TcpChannel {
    inner: Arc<TcpChannelInner>,
}

impl TcpChannel {
    /// 根据上下文建立到目标地址的连接。
    pub async fn connect(
        ctx: &CallContext,
        addr: TransportSocketAddr,
        settings: TcpSettings,
    ) -> Result<Self, AmqpError> {
        let stream =
            run_with_context(ctx, error::CONNECT, TokioTcpStream::connect(addr.to_std())).await?;
        Self::from_parts(stream, settings)
    }

    /// 将已建立的 Tokio 连接包装为通道，应用套接字选项并初始化方向状态。
    pub(crate) fn from_parts(
        stream: TokioTcpStream,
        settings: TcpSettings,
    ) -> Result<Self, AmqpError> {
        stream
            .set_nodelay(settings.nodelay())
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;

        let std_stream = stream
            .into_std()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let abort_handle = std_stream
            .try_clone()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let stream = TokioTcpStream::from_std(std_stream)
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;

        let (read_half, write_half) = stream.into_split();
        let unit_size = settings.segment_pool().segment_size() as u64;
        let window = settings.tracker_window();
        Ok(Self {
            inner: Arc::new(TcpChannelInner {
                read: AsyncMutex::new(ReadState {
                    half: read_half,
                    tracker: BufferSizeTracker::new(unit_size, window),
                    buffer: ReadBuffer::Pooled(settings.segment_pool().take()),
                }),
                write: AsyncMutex::new(WriteState {
                    half: write_half,
                    tracker: BufferSizeTracker::new(unit_size, window),
                    merge: BytesMut::new(),
                }),
                read_gate: DirectionGate::new(),
                write_gate: DirectionGate::new(),
                close_gate: CloseGate::new(),
                local_addr: TransportSocketAddr::from(local_addr),
                peer_addr: TransportSocketAddr::from(peer_addr),
                settings,
                abort_handle,
            }),
        })
    }

    /// 本地地址。
    pub fn local_addr(&self) -> TransportSocketAddr {
        self.inner.local_addr
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> TransportSocketAddr {
        self.inner.peer_addr
    }

    /// 读取数据写入 `buf`；优先消费缓冲余量，命中即免去系统调用。
    pub async fn read(
        &self,
        ctx: &CallContext,
        buf: &mut (dyn BufMut + Send),
    ) -> Result<usize, AmqpError> {
        let _permit = self
            .inner
            .read_gate
            .begin()
            .map_err(|rejection| gate_error(error::READ, rejection))?;
        if buf.remaining_mut() == 0 {
            return Ok(0);
        }
        let mut guard = self.inner.read.lock().await;
        let state = &mut *guard;

        let served = serve_from_cache(&mut state.buffer, buf);
        if served > 0 {
            self.settle_read(state, served as u64);
            return Ok(served);
        }

        ensure_read_buffer(state, &self.inner.settings);
        let received = match &mut state.buffer {
            ReadBuffer::Pooled(segment) => {
                segment.recycle();
                run_with_context(ctx, error::READ, state.half.read_buf(segment.data_mut())).await?
            }
            ReadBuffer::Growable(buffer) => {
                let target = self
                    .inner
                    .settings
                    .buffer_size_for(state.tracker.level());
                buffer.clear();
                if buffer.capacity() < target {
                    buffer.reserve(target);
                }
                run_with_context(ctx, error::READ, state.half.read_buf(buffer)).await?
            }
        };
        if received == 0 {
            return Ok(0);
        }

        let served = serve_from_cache(&mut state.buffer, buf);
        self.settle_read(state, received as u64);
        Ok(served)
    }

    /// 写入一组缓冲并保证全部落盘，返回总字节数。
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

        let merge_limit = self
            .inner
            .settings
            .buffer_size_for(state.tracker.level());
        if bufs.len() > 1 && total <= merge_limit {
            // 多个小缓冲合并为一次连续写出，省去逐段系统调用。
            state.merge.clear();
            state.merge.reserve(total);
            for buf in bufs {
                state.merge.extend_from_slice(buf);
            }
            let WriteState { half, merge, .. } = &mut *state;
            run_with_context(ctx, error::WRITE, half.write_all(&merge[..])).await?;
            merge.clear();
        } else if bufs.len() > 1 {
            write_all_vectored(ctx, &mut state.half, bufs).await?;
        } else {
            run_with_context(ctx, error::WRITE, state.half.write_all(&bufs[0])).await?;
        }

        self.settle_write(state, total as u64);
        Ok(total)
    }

    /// 排空写方向的内核缓冲。
    pub async fn flush(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        let _permit = self
            .inner
            .write_gate
            .begin()
            .map_err(|rejection| gate_error(error::FLUSH, rejection))?;
        let mut guard = self.inner.write.lock().await;
        run_with_context(ctx, error::FLUSH, guard.half.flush()).await
    }

    /// 优雅关闭：发送 FIN 并拒绝后续操作，重复调用为空操作。
    pub async fn shutdown(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        if !self.inner.close_gate.begin_close() {
            return Ok(());
        }
        self.inner.read_gate.dispose();
        self.inner.write_gate.dispose();
        self.reclaim_read_buffer();
        let mut guard = self.inner.write.lock().await;
        run_with_context(ctx, error::SHUTDOWN, guard.half.shutdown()).await
    }

    /// 立即关闭：经复制句柄同步切断双向数据流，幂等。
    pub fn abort(&self) {
        let first = self.inner.close_gate.begin_close();
        self.inner.read_gate.dispose();
        self.inner.write_gate.dispose();
        if first {
            self.reclaim_read_buffer();
        }
        let _ = self.inner.abort_handle.shutdown(StdShutdown::Both);
    }

    /// 独占拆解为原始字节流，归还池化段并交出地址元数据。
    pub fn try_into_io(self) -> Result<TransportIo, AmqpError> {
        if self.inner.close_gate.is_closed() {
            return Err(gate_error(
                error::DISSOLVE,
                amqp_core::completion::GateRejection::Disposed,
            ));
        }
        let inner = Arc::try_unwrap(self.inner).map_err(|_| exclusive_channel_error())?;
        let TcpChannelInner {
            read,
            write,
            local_addr,
            peer_addr,
            settings,
            ..
        } = inner;
        let ReadState {
            half,
            buffer,
            tracker: read_tracker,
        } = read.into_inner();
        // 流水线对端可能让载荷字节先于拆解进入缓存，必须随流迁移。
        let remainder = match buffer {
            ReadBuffer::Pooled(mut segment) => {
                let data = segment.data_mut();
                let bytes = Bytes::copy_from_slice(&data[..]);
                data.clear();
                bytes
            }
            ReadBuffer::Growable(cache) => cache.freeze(),
        };
        let WriteState {
            half: write_half,
            tracker: write_tracker,
            ..
        } = write.into_inner();
        let stream = half
            .reunite(write_half)
            .map_err(|err| amqp_core::error::fatal("amqp.transport.tcp.reunite_failed", err))?;
        // 档位跟踪随流迁移：上层安全分层之下仍保持内核缓冲自适应。
        let adaptive = AdaptiveIo::new(stream, read_tracker, write_tracker, settings);
        let io: amqp_transport::BoxIo = if remainder.is_empty() {
            Box::new(adaptive)
        } else {
            Box::new(PrefixedIo::new(remainder, adaptive))
        };
        Ok(TransportIo {
            io,
            local_addr: Some(local_addr),
            peer_addr: Some(peer_addr),
            security: TransportSecurity::None,
        })
    }

    /// 装箱为统一的传输能力对象。
    pub fn boxed(self) -> BoxTransport {
        Box::new(self)
    }

    fn settle_read(&self, state: &mut ReadState, bytes: u64) {
        if let Some(level) = state.tracker.record(monotonic_now(), bytes) {
            tracing::trace!(level = ?level, peer = %self.inner.peer_addr, "tcp 读缓冲档位变化");
            self.resize_socket_buffer(level, Direction::Read);
        }
    }

    fn settle_write(&self, state: &mut WriteState, bytes: u64) {
        if let Some(level) = state.tracker.record(monotonic_now(), bytes) {
            tracing::trace!(level = ?level, peer = %self.inner.peer_addr, "tcp 写缓冲档位变化");
            self.resize_socket_buffer(level, Direction::Write);
        }
    }

    fn resize_socket_buffer(&self, level: BufferLevel, direction: Direction) {
        let size = self.inner.settings.buffer_size_for(level);
        let socket = SockRef::from(&self.inner.abort_handle);
        let outcome = match direction {
            Direction::Read => socket.set_recv_buffer_size(size),
            Direction::Write => socket.set_send_buffer_size(size),
        };
        if let Err(err) = outcome {
            // 调整失败不致命，数据通路继续以旧缓冲运行。
            tracing::warn!(error = %err, size, "内核套接字缓冲调整失败");
        }
    }

    fn reclaim_read_buffer(&self) {
        if let Ok(mut read) = self.inner.read.try_lock() {
            read.buffer = ReadBuffer::Growable(BytesMut::new());
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Read,
    Write,
}

/// 从缓冲余量向 `buf` 拷贝，返回服务的字节数。
fn serve_from_cache(cache: &mut ReadBuffer, buf: &mut (dyn BufMut + Send)) -> usize {
    let data: &mut BytesMut = match cache {
        ReadBuffer::Pooled(segment) => segment.data_mut(),
        ReadBuffer::Growable(buffer) => buffer,
    };
    let want = data.len().min(buf.remaining_mut());
    if want == 0 {
        return 0;
    }
    buf.put_slice(&data[..want]);
    data.advance(want);
    want
}

/// 在方向空载时按当前档位切换缓冲形态。
fn ensure_read_buffer(state: &mut ReadState, settings: &TcpSettings) {
    if state.buffer.remaining() > 0 {
        return;
    }
    let level = state.tracker.level();
    match (&state.buffer, level) {
        (ReadBuffer::Growable(_), BufferLevel::Idle) => {
            state.buffer = ReadBuffer::Pooled(settings.segment_pool().take());
        }
        (ReadBuffer::Pooled(_), BufferLevel::Active | BufferLevel::Busy) => {
            state.buffer =
                ReadBuffer::Growable(BytesMut::with_capacity(settings.buffer_size_for(level)));
        }
        _ => {}
    }
}

/// 将多个缓冲以 vectored 写循环全部落盘。
async fn write_all_vectored(
    ctx: &CallContext,
    half: &mut OwnedWriteHalf,
    bufs: &[Bytes],
) -> Result<(), AmqpError> {
    let mut index = 0usize;
    let mut offset = 0usize;
    while index < bufs.len() {
        let slices: Vec<IoSlice<'_>> = std::iter::once(IoSlice::new(&bufs[index][offset..]))
            .chain(bufs[index + 1..].iter().map(|buf| IoSlice::new(buf)))
            .collect();
        let written = run_with_context(ctx, error::WRITE, half.write_vectored(&slices)).await?;
        if written == 0 {
            return Err(error::map_io_error(
                error::WRITE,
                std::io::Error::new(std::io::ErrorKind::WriteZero, "vectored write stalled"),
            ));
        }
        // 将写出的字节数折算回 (index, offset) 游标。
        let mut remaining = written;
        while remaining > 0 && index < bufs.len() {
            let available = bufs[index].len() - offset;
            if remaining >= available {
                remaining -= available;
                index += 1;
                offset = 0;
            } else {
                offset += remaining;
                remaining = 0;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Transport for TcpChannel {
    fn scheme(&self) -> &'static str {
        "tcp"
    }

    fn local_addr(&self) -> Option<TransportSocketAddr> {
        Some(self.inner.local_addr)
    }

    fn peer_addr(&self) -> Option<TransportSocketAddr> {
        Some(self.inner.peer_addr)
    }

    fn security(&self) -> TransportSecurity {
        TransportSecurity::None
    }

    async fn read(
        &self,
        ctx: &CallContext,
        buf: &mut (dyn BufMut + Send),
    ) -> Result<usize, AmqpError> {
        TcpChannel::read(self, ctx, buf).await
    }

    async fn write(&self, ctx: &CallContext, bufs: &[Bytes]) -> Result<usize, AmqpError> {
        TcpChannel::write(self, ctx, bufs).await
    }

    async fn flush(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        TcpChannel::flush(self, ctx).await
    }

    async fn shutdown(&self, ctx: &CallContext) -> Result<(), AmqpError> {
        TcpChannel::shutdown(self, ctx).await
    }

    fn abort(&self) {
        TcpChannel::abort(self);
    }

    fn into_io(self: Box<Self>) -> Result<TransportIo, AmqpError> {
        (*self).try_into_io()
    }
}
