use bytes::{Buf, Bytes};
use std::io::IoSlice;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// 带前缀的字节流：先服务拆解时残留的缓存余量，再透传内层流。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 基座传输的读路径会按档位整块读取套接字，流水线式的对端可能把
///   下一层握手的首批字节与协议头一起送达；拆解升级时这些字节已离开
///   内核缓冲，必须随字节流一起移交，否则新层会从流中间开始解析；
/// - 以读适配器而非"回塞内核"的方式解决：对 `rustls` 等消费方完全
///   透明。
///
/// ## 契约（What）
/// - 读：前缀未耗尽时恰好从前缀服务，耗尽后转发内层流；
/// - 写：全部操作直接透传内层流；
/// - 前缀为空时行为与内层流逐字节一致。
#[derive(Debug)]
pub struct PrefixedIo<T> {
    prefix: Bytes,
    io: T,
}

impl<T> PrefixedIo<T> {
    /// 以前缀与内层流构造适配器。
    pub fn new(prefix: Bytes, io: T) -> Self {
        Self { prefix, io }
    }

    /// 尚未被消费的前缀字节数。
    pub fn prefix_remaining(&self) -> usize {
        self.prefix.len()
    }
}

impl<T> AsyncRead for PrefixedIo<T>
where
    T: AsyncRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if !self.prefix.is_empty() {
            let want = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..want]);
            self.prefix.advance(want);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl<T> AsyncWrite for PrefixedIo<T>
where
    T: AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }
}
