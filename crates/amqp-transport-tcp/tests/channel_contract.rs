//! `channel_contract` 集成测试：在回环连接上验证 TCP 通道的读写、缓存、
//! 并发纪律与关闭纪律。
//!
//! # 测试目标（Why）
//! - 通道是协商链的基座，读写语义或关闭配平的回归会放大到整条链路；
//! - 所有用例通过公开 API 驱动，覆盖缓存短路、误用拒绝与池化段归还。

use amqp_buffer::SegmentPool;
use amqp_core::contract::{CallContext, Deadline};
use amqp_core::error::ErrorCategory;
use amqp_core::time::monotonic_now;
use amqp_transport::TransportSocketAddr;
use amqp_transport_tcp::{TcpChannel, TcpListener, TcpSettings};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;

fn ctx() -> CallContext {
    CallContext::builder().build()
}

fn loopback() -> TransportSocketAddr {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("解析回环地址");
    TransportSocketAddr::from(addr)
}

/// 建立一对互联的通道：返回（发起端，接受端）。
async fn connected_pair(
    client_settings: TcpSettings,
    server_settings: TcpSettings,
) -> (TcpChannel, TcpChannel) {
    let listener = TcpListener::bind_with_settings(loopback(), server_settings)
        .await
        .expect("绑定监听器");
    let addr = listener.local_addr();
    let client = tokio::spawn({
        let ctx = ctx();
        async move { TcpChannel::connect(&ctx, addr, client_settings).await }
    });
    let (server, _) = listener.accept(&ctx()).await.expect("接受连接");
    let client = client.await.expect("建连任务崩溃").expect("建连失败");
    (client, server)
}

/// 单缓冲写入在对端完整可读。
#[tokio::test(flavor = "multi_thread")]
async fn write_then_read_round_trips() {
    let (client, server) = connected_pair(TcpSettings::default(), TcpSettings::default()).await;
    let payload = Bytes::from_static(b"open-frame");
    let written = client
        .write(&ctx(), std::slice::from_ref(&payload))
        .await
        .expect("写入失败");
    assert_eq!(written, payload.len());

    let mut received = BytesMut::new();
    while received.len() < payload.len() {
        let n = server
            .read(&ctx(), &mut received)
            .await
            .expect("读取失败");
        assert_ne!(n, 0, "对端不应提前关闭");
    }
    assert_eq!(&received[..], &payload[..]);
}

/// 多个非连续缓冲合并写出，字节序与提交顺序一致。
#[tokio::test(flavor = "multi_thread")]
async fn vectored_write_preserves_order() {
    let (client, server) = connected_pair(TcpSettings::default(), TcpSettings::default()).await;
    let bufs = [
        Bytes::from_static(b"AMQP"),
        Bytes::from_static(&[0x02]),
        Bytes::from_static(&[1, 0, 0]),
    ];
    let written = client.write(&ctx(), &bufs).await.expect("合并写入失败");
    assert_eq!(written, 8);

    let mut received = BytesMut::new();
    while received.len() < 8 {
        let n = server.read(&ctx(), &mut received).await.expect("读取失败");
        assert_ne!(n, 0);
    }
    assert_eq!(&received[..], b"AMQP\x02\x01\x00\x00");
}

/// 一次到达的多余字节由缓存服务后续逻辑读取。
#[tokio::test(flavor = "multi_thread")]
async fn cached_remainder_serves_next_read() {
    let (client, server) = connected_pair(TcpSettings::default(), TcpSettings::default()).await;
    let payload = Bytes::from_static(b"\x00\x00\x00\x08preamble");
    client
        .write(&ctx(), std::slice::from_ref(&payload))
        .await
        .expect("写入失败");
    // 留足到达时间，让 12 字节进入同一次套接字读取。
    tokio::time::sleep(Duration::from_millis(50)).await;

    // 第一次逻辑读仅取 4 字节帧长前缀。
    let mut frame_len = BytesMut::new();
    let mut limited = (&mut frame_len).limit(4);
    let n = server.read(&ctx(), &mut limited).await.expect("读取前缀");
    assert_eq!(n, 4);
    assert_eq!(&frame_len[..], &[0x00, 0x00, 0x00, 0x08]);

    // 剩余 8 字节来自缓存余量。
    let mut body = BytesMut::new();
    let n = server.read(&ctx(), &mut body).await.expect("读取余量");
    assert_eq!(n, 8);
    assert_eq!(&body[..], b"preamble");
}

/// 同方向并发重入以 `Misuse` 分类拒绝。
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_read_is_rejected_as_misuse() {
    let (client, server) = connected_pair(TcpSettings::default(), TcpSettings::default()).await;
    let reader = server.clone();
    let pending = tokio::spawn(async move {
        let mut sink = BytesMut::new();
        // 对端不写数据，读取保持在途。
        reader.read(&ctx(), &mut sink).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut sink = BytesMut::new();
    let err = server
        .read(&ctx(), &mut sink)
        .await
        .expect_err("并发读取必须被拒绝");
    assert_eq!(err.category(), ErrorCategory::Misuse);

    // 解除在途读取。
    client
        .write(&ctx(), &[Bytes::from_static(b"x")])
        .await
        .expect("写入失败");
    pending
        .await
        .expect("读取任务崩溃")
        .expect("在途读取应正常完成");
}

/// 截止时间耗尽以 `Timeout` 分类失败。
#[tokio::test(flavor = "multi_thread")]
async fn read_deadline_expires_with_timeout() {
    let (_client, server) = connected_pair(TcpSettings::default(), TcpSettings::default()).await;
    let deadline = Deadline::with_timeout(monotonic_now(), Duration::from_millis(80));
    let ctx = CallContext::builder().with_deadline(deadline).build();
    let mut sink = BytesMut::new();
    let err = server
        .read(&ctx, &mut sink)
        .await
        .expect_err("静默对端上的读取必须超时");
    assert_eq!(err.category(), ErrorCategory::Timeout);
}

/// 关闭幂等；关闭后的操作以 `Misuse` 拒绝；池化段恰好归还一次。
#[tokio::test(flavor = "multi_thread")]
async fn close_is_idempotent_and_reclaims_segment() {
    let pool = SegmentPool::new(256, 8);
    let settings = TcpSettings::default().with_segment_pool(pool.clone());
    let (_client, server) = connected_pair(TcpSettings::default(), settings).await;
    assert_eq!(pool.stats().active, 1, "接受端通道应持有一个池化段");

    server.shutdown(&ctx()).await.expect("首次关闭");
    server.shutdown(&ctx()).await.expect("重复关闭应为空操作");
    // 中止与关闭竞争同一闸门，亦不得二次归还。
    server.abort();

    let stats = pool.stats();
    assert_eq!(stats.active, 0, "关闭后段必须回池");
    assert_eq!(stats.total_recycled, 1, "段恰好归还一次");

    let mut sink = BytesMut::new();
    let err = server
        .read(&ctx(), &mut sink)
        .await
        .expect_err("关闭后的读取必须被拒绝");
    assert_eq!(err.category(), ErrorCategory::Misuse);
    let err = server
        .write(&ctx(), &[Bytes::from_static(b"y")])
        .await
        .expect_err("关闭后的写入必须被拒绝");
    assert_eq!(err.category(), ErrorCategory::Misuse);
}

/// 读取在途时中止：在途读取终结，池化段恰好归还一次。
#[tokio::test(flavor = "multi_thread")]
async fn abort_mid_read_returns_segment_exactly_once() {
    let pool = SegmentPool::new(256, 8);
    let settings = TcpSettings::default().with_segment_pool(pool.clone());
    let (_client, server) = connected_pair(TcpSettings::default(), settings).await;

    let reader = server.clone();
    let pending = tokio::spawn(async move {
        let mut sink = BytesMut::new();
        // 对端静默，读取保持在途，直到中止切断数据流。
        reader.read(&ctx(), &mut sink).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.abort();
    server.abort();
    // 中止切断套接字后，在途读取以有序关闭或传输错误终结，不得悬挂。
    let _ = pending.await.expect("读取任务崩溃");

    drop(server);
    let stats = pool.stats();
    assert_eq!(stats.active, 0, "中止路径不得遗留在外流通的段");
    assert_eq!(stats.total_recycled, 1, "段恰好归还一次，不得双重归还");
}

/// 对端有序关闭时读取返回 0。
#[tokio::test(flavor = "multi_thread")]
async fn read_returns_zero_on_peer_close() {
    let (client, server) = connected_pair(TcpSettings::default(), TcpSettings::default()).await;
    client.shutdown(&ctx()).await.expect("客户端关闭");
    let mut sink = BytesMut::new();
    let n = server.read(&ctx(), &mut sink).await.expect("读取失败");
    assert_eq!(n, 0);
}
