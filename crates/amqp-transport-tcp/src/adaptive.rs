use crate::settings::TcpSettings;
use amqp_buffer::{BufferLevel, BufferSizeTracker};
use amqp_core::time::monotonic_now;
use socket2::SockRef;
use std::io::IoSlice;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// 携带档位跟踪的原始字节流：通道拆解后自适应缓冲随流存续。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 安全分层升级会把 TCP 通道拆解为原始流；若度量随通道一起消亡，
///   占多数的加密连接将永远停留在拆解时的内核缓冲档位。该包装让
///   每方向的流量记账与 `SO_RCVBUF`/`SO_SNDBUF` 调整继续生效；
/// - 跟踪器从通道迁移而来，升级前累计的窗口状态不清零。
///
/// ## 契约（What）
/// - 读写语义与内层 `TcpStream` 逐字节一致；
/// - 档位推进仍然遵循迟滞规则，调整失败只降级为告警；
/// - 用户态的段池与读缓存不随流迁移——加密层有自己的记录缓冲，
///   这里只保留内核缓冲档位这一跨层关注点。
#[derive(Debug)]
pub(crate) struct AdaptiveIo {
    stream: TcpStream,
    read_tracker: BufferSizeTracker,
    write_tracker: BufferSizeTracker,
    settings: TcpSettings,
}

impl AdaptiveIo {
    pub(crate) fn new(
        stream: TcpStream,
        read_tracker: BufferSizeTracker,
        write_tracker: BufferSizeTracker,
        settings: TcpSettings,
    ) -> Self {
        Self {
            stream,
            read_tracker,
            write_tracker,
            settings,
        }
    }

    fn settle_read(&mut self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        if let Some(level) = self.read_tracker.record(monotonic_now(), bytes as u64) {
            self.resize(level, true);
        }
    }

    fn settle_write(&mut self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        if let Some(level) = self.write_tracker.record(monotonic_now(), bytes as u64) {
            self.resize(level, false);
        }
    }

    fn resize(&self, level: BufferLevel, read_direction: bool) {
        let size = self.settings.buffer_size_for(level);
        let socket = SockRef::from(&self.stream);
        let outcome = if read_direction {
            socket.set_recv_buffer_size(size)
        } else {
            socket.set_send_buffer_size(size)
        };
        if let Err(err) = outcome {
            tracing::warn!(error = %err, size, "内核套接字缓冲调整失败");
        }
    }
}

impl AsyncRead for AdaptiveIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.stream).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let received = buf.filled().len() - before;
                self.settle_read(received);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl AsyncWrite for AdaptiveIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match Pin::new(&mut self.stream).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                self.settle_write(written);
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<std::io::Result<usize>> {
        match Pin::new(&mut self.stream).poll_write_vectored(cx, bufs) {
            Poll::Ready(Ok(written)) => {
                self.settle_write(written);
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }
}
