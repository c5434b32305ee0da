//! `tls_contract` 集成测试：在真实 TCP 回环上验证握手、身份附着与
//! 加密读写契约。
//!
//! # 测试目标（Why）
//! - TLS 层是准入策略的事实来源：`security()` 的取值与对端身份附着
//!   必须与握手配置严格对应；
//! - 证书由 `rcgen` 在测试内生成，用例自包含、不依赖外部材料。

use amqp_core::contract::CallContext;
use amqp_transport::Transport;
use amqp_transport_tcp::{TcpChannel, TcpListener, TcpSettings};
use amqp_transport_tls::{TlsAcceptor, TlsChannel, TlsConnector, client_config, server_config};
use bytes::{Bytes, BytesMut};
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use std::net::SocketAddr;

fn ctx() -> CallContext {
    CallContext::builder().build()
}

struct TestIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

fn generate_identity(host: &str) -> TestIdentity {
    let certified = rcgen::generate_simple_self_signed(vec![host.to_string()])
        .expect("生成自签名证书");
    let chain = vec![certified.cert.der().clone()];
    let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));
    TestIdentity { chain, key }
}

fn roots_for(identity: &TestIdentity) -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots
        .add(identity.chain[0].clone())
        .expect("装入信任根");
    roots
}

async fn tcp_pair() -> (TcpChannel, TcpChannel) {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("解析地址");
    let listener = TcpListener::bind(addr.into()).await.expect("绑定监听器");
    let target = listener.local_addr();
    let client = tokio::spawn({
        let ctx = ctx();
        async move { TcpChannel::connect(&ctx, target, TcpSettings::default()).await }
    });
    let (server, _) = listener.accept(&ctx()).await.expect("接受连接");
    let client = client.await.expect("建连任务崩溃").expect("建连失败");
    (client, server)
}

/// 执行一次完整的双向认证握手，返回（客户端通道，服务端通道）。
async fn handshake_pair(mutual: bool) -> (TlsChannel, TlsChannel) {
    let server_identity = generate_identity("localhost");
    let client_identity = generate_identity("amqp-client");

    let server_cfg = server_config(
        server_identity.chain.clone(),
        server_identity.key.clone_key(),
        mutual.then(|| roots_for(&client_identity)),
    )
    .expect("装配服务端配置");
    let client_cfg = client_config(
        roots_for(&server_identity),
        mutual.then(|| {
            (
                client_identity.chain.clone(),
                client_identity.key.clone_key(),
            )
        }),
    )
    .expect("装配客户端配置");

    let acceptor = TlsAcceptor::new(server_cfg).with_mutual_auth(mutual);
    let connector = TlsConnector::new(
        client_cfg,
        ServerName::try_from("localhost".to_string()).expect("解析目标名称"),
    )
    .with_mutual_auth(mutual);

    let (tcp_client, tcp_server) = tcp_pair().await;
    let server_task = tokio::spawn({
        let ctx = ctx();
        async move {
            let parts = tcp_server.try_into_io().expect("拆解服务端通道");
            acceptor.accept(&ctx, parts).await
        }
    });
    let parts = tcp_client.try_into_io().expect("拆解客户端通道");
    let client = connector.connect(&ctx(), parts).await.expect("客户端握手");
    let server = server_task
        .await
        .expect("服务端任务崩溃")
        .expect("服务端握手");
    (client, server)
}

/// 单向认证：双方 `security()` 均为加密，但不附着对端身份。
#[tokio::test(flavor = "multi_thread")]
async fn one_way_handshake_is_secure_without_identity() {
    let (client, server) = handshake_pair(false).await;
    assert!(client.security().is_secure());
    assert!(server.security().is_secure());
    assert!(server.security().peer_identity().is_none());
}

/// 双向认证：服务端附着客户端叶子证书为对端身份。
#[tokio::test(flavor = "multi_thread")]
async fn mutual_handshake_attaches_peer_identity() {
    let (client, server) = handshake_pair(true).await;
    assert!(client.security().is_secure());
    let identity = server
        .security()
        .peer_identity()
        .cloned()
        .expect("双向认证后必须附着对端身份");
    assert!(!identity.certificate_der().is_empty());
    // 客户端同样能观察到服务端身份。
    assert!(client.security().peer_identity().is_some());
}

/// 加密链路上的往返读写，多缓冲写在对端按序完整到达。
#[tokio::test(flavor = "multi_thread")]
async fn encrypted_round_trip_preserves_bytes() {
    let (client, server) = handshake_pair(false).await;
    let bufs = [
        Bytes::from_static(b"sasl-init:"),
        Bytes::from_static(b"PLAIN"),
    ];
    let written = client.write(&ctx(), &bufs).await.expect("加密写入");
    client.flush(&ctx()).await.expect("刷新");
    assert_eq!(written, 15);

    let mut received = BytesMut::new();
    while received.len() < 15 {
        let n = server.read(&ctx(), &mut received).await.expect("解密读取");
        assert_ne!(n, 0, "对端不应提前关闭");
    }
    assert_eq!(&received[..], b"sasl-init:PLAIN");
}

/// 关闭幂等：`close_notify` 恰好一次，对端读到有序关闭。
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_is_idempotent_and_observable() {
    let (client, server) = handshake_pair(false).await;
    client.shutdown(&ctx()).await.expect("首次关闭");
    client.shutdown(&ctx()).await.expect("重复关闭应为空操作");

    let mut sink = BytesMut::new();
    let n = server.read(&ctx(), &mut sink).await.expect("读取关闭信号");
    assert_eq!(n, 0, "对端关闭后读取应返回 0");
}
