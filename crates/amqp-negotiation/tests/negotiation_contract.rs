//! `negotiation_contract` 集成测试：发起端与监听端在真实回环连接上的
//! 端到端协商契约。
//!
//! # 测试目标（Why）
//! - 收敛性：双方约定同一条链时，发起端恰好按链序完成全部升级；
//! - 拒绝路径：版本不匹配、未知协议、准入不达标的连接绝不上交；
//! - 资源纪律：每条失败路径都以连接关闭收场，监听器自身保持可用。

use amqp_core::contract::CallContext;
use amqp_core::error::ErrorCategory;
use amqp_core::header::{PROTOCOL_HEADER_SIZE, ProtocolHeader, ProtocolId, ProtocolVersion};
use amqp_negotiation::{
    AdmissionPolicy, AmqpProvider, ListenerSettings, NegotiationListener, TransportInitiator,
};
use amqp_transport::{ProviderChain, Transport, TransportSocketAddr};
use amqp_transport_tls::{TlsAcceptor, TlsConnector, TlsProvider, client_config, server_config};
use bytes::{Bytes, BytesMut};
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn ctx() -> CallContext {
    CallContext::builder().build()
}

fn loopback() -> TransportSocketAddr {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("解析回环地址");
    TransportSocketAddr::from(addr)
}

const AMQP_HEADER: ProtocolHeader =
    ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::V1_0_0);
const TLS_HEADER: ProtocolHeader = ProtocolHeader::new(ProtocolId::Tls, ProtocolVersion::V1_0_0);

struct TestIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

fn generate_identity(host: &str) -> TestIdentity {
    let certified =
        rcgen::generate_simple_self_signed(vec![host.to_string()]).expect("生成自签名证书");
    TestIdentity {
        chain: vec![certified.cert.der().clone()],
        key: PrivateKeyDer::from(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        )),
    }
}

/// 构造一对约定 `[tls, amqp]` 链的发起端/监听端 Provider 链。
fn tls_chains() -> (Arc<ProviderChain>, Arc<ProviderChain>) {
    let server_identity = generate_identity("localhost");
    let mut roots = RootCertStore::empty();
    roots
        .add(server_identity.chain[0].clone())
        .expect("装入信任根");

    let server_cfg = server_config(server_identity.chain.clone(), server_identity.key, None)
        .expect("装配服务端配置");
    let client_cfg = client_config(roots, None).expect("装配客户端配置");

    let connector = TlsConnector::new(
        client_cfg,
        ServerName::try_from("localhost".to_string()).expect("解析目标名称"),
    );
    let acceptor = TlsAcceptor::new(server_cfg);

    let initiator_chain = ProviderChain::builder()
        .push(Arc::new(TlsProvider::for_initiator(connector)))
        .push(Arc::new(AmqpProvider::new()))
        .build()
        .expect("构建发起端链");
    let listener_chain = ProviderChain::builder()
        .push(Arc::new(TlsProvider::for_listener(acceptor)))
        .push(Arc::new(AmqpProvider::new()))
        .build()
        .expect("构建监听端链");
    (initiator_chain, listener_chain)
}

fn amqp_only_chain() -> Arc<ProviderChain> {
    ProviderChain::builder()
        .push(Arc::new(AmqpProvider::new()))
        .build()
        .expect("构建纯终端链")
}

/// 链首即终端：发起端不发生任何升级，基座连接直接交付。
#[tokio::test(flavor = "multi_thread")]
async fn terminal_first_chain_completes_without_upgrade() {
    let listener = NegotiationListener::bind(
        loopback(),
        amqp_only_chain(),
        ListenerSettings::default(),
    )
    .await
    .expect("绑定监听器");
    let target = listener.local_addr();

    let accept = tokio::spawn(async move { listener.accept_one().await });

    let initiator = TransportInitiator::new(amqp_only_chain(), target);
    let established = initiator.connect(&ctx()).await.expect("发起端协商");
    assert_eq!(established.upgrades, 0);
    assert_eq!(established.transport.scheme(), "tcp");
    assert!(!established.transport.security().is_secure());

    // 更高协议层的首个动作：发送 AMQP 协议头与首帧载荷。
    let header = Bytes::copy_from_slice(&AMQP_HEADER.encode());
    let payload = Bytes::from_static(b"open-performative");
    established
        .transport
        .write(&ctx(), &[header, payload.clone()])
        .await
        .expect("写入协议头与载荷");

    let accepted = accept
        .await
        .expect("接受任务崩溃")
        .expect("监听端协商");
    assert_eq!(accepted.header, AMQP_HEADER);
    assert!(!accepted.transport.security().is_secure());

    // 头部被恰好消费：上交的传输层里只剩载荷字节。
    let mut received = BytesMut::new();
    while received.len() < payload.len() {
        let n = accepted
            .transport
            .read(&ctx(), &mut received)
            .await
            .expect("读取载荷");
        assert_ne!(n, 0);
    }
    assert_eq!(&received[..], &payload[..]);
}

/// `[tls, amqp]` 链收敛：恰好一次升级，双侧均为加密链路，头部零残留。
#[tokio::test(flavor = "multi_thread")]
async fn tls_chain_converges_with_secure_both_sides() {
    let (initiator_chain, listener_chain) = tls_chains();
    let listener =
        NegotiationListener::bind(loopback(), listener_chain, ListenerSettings::default())
            .await
            .expect("绑定监听器");
    let target = listener.local_addr();

    let accept = tokio::spawn(async move { listener.accept_one().await });

    let initiator = TransportInitiator::new(initiator_chain, target);
    let established = initiator.connect(&ctx()).await.expect("发起端协商");
    assert_eq!(established.upgrades, 1, "链中只有一次 TLS 升级");
    assert_eq!(established.transport.scheme(), "tls");
    assert!(established.transport.security().is_secure());

    // 升级完成后由更高层在加密链路上发送终端协议头与载荷。
    let header = Bytes::copy_from_slice(&AMQP_HEADER.encode());
    let payload = Bytes::from_static(b"begin-performative");
    established
        .transport
        .write(&ctx(), &[header, payload.clone()])
        .await
        .expect("写入协议头与载荷");
    established.transport.flush(&ctx()).await.expect("刷新");

    let accepted = accept
        .await
        .expect("接受任务崩溃")
        .expect("监听端协商");
    assert_eq!(accepted.header, AMQP_HEADER);
    assert!(accepted.transport.security().is_secure());

    let mut received = BytesMut::new();
    while received.len() < payload.len() {
        let n = accepted
            .transport
            .read(&ctx(), &mut received)
            .await
            .expect("读取载荷");
        assert_ne!(n, 0, "头部之外的载荷必须完整到达");
    }
    assert_eq!(&received[..], &payload[..]);
}

/// 对端回显不同版本：发起端以协商类错误终态失败，不自动重试。
#[tokio::test(flavor = "multi_thread")]
async fn initiator_rejects_version_mismatch() {
    let raw = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("绑定裸监听器");
    let target = TransportSocketAddr::from(raw.local_addr().expect("读取地址"));

    let server = tokio::spawn(async move {
        let (mut stream, _) = raw.accept().await.expect("接受连接");
        let mut header = [0u8; PROTOCOL_HEADER_SIZE];
        stream.read_exact(&mut header).await.expect("读取协议头");
        // 以不同版本回应。
        let reply = ProtocolHeader::new(ProtocolId::Tls, ProtocolVersion::new(9, 9, 9));
        stream.write_all(&reply.encode()).await.expect("回写协议头");
        // 对端应当关闭连接。
        let mut probe = [0u8; 1];
        let n = stream.read(&mut probe).await.unwrap_or(0);
        assert_eq!(n, 0, "发起端失败后必须关闭连接");
    });

    let (initiator_chain, _) = tls_chains();
    let initiator = TransportInitiator::new(initiator_chain, target);
    let err = initiator
        .connect(&ctx())
        .await
        .expect_err("版本不匹配必须失败");
    assert_eq!(err.category(), ErrorCategory::Negotiation);
    server.await.expect("服务端任务崩溃");
}

/// 监听端对不支持的版本回写最优版本并拒绝，连接不上交。
#[tokio::test(flavor = "multi_thread")]
async fn listener_rejects_unsupported_version() {
    let (_, listener_chain) = tls_chains();
    let listener =
        NegotiationListener::bind(loopback(), listener_chain, ListenerSettings::default())
            .await
            .expect("绑定监听器");
    let target = listener.local_addr().to_std();

    let accept = tokio::spawn(async move { listener.accept_one().await });

    let mut client = tokio::net::TcpStream::connect(target).await.expect("建连");
    let bogus = ProtocolHeader::new(ProtocolId::Tls, ProtocolVersion::new(9, 9, 9));
    client.write_all(&bogus.encode()).await.expect("写入协议头");

    let mut reply = [0u8; PROTOCOL_HEADER_SIZE];
    client.read_exact(&mut reply).await.expect("读取回写头部");
    assert_eq!(
        ProtocolHeader::decode(&reply).expect("解码回写头部"),
        TLS_HEADER,
        "回写的应是监听端的最优版本"
    );
    let mut probe = [0u8; 1];
    let n = client.read(&mut probe).await.unwrap_or(0);
    assert_eq!(n, 0, "拒绝后连接必须关闭");

    let err = accept
        .await
        .expect("接受任务崩溃")
        .expect_err("不支持的版本不得上交");
    assert_eq!(err.category(), ErrorCategory::Negotiation);
}

/// 未配置的协议号：回写终端默认头部后拒绝。
#[tokio::test(flavor = "multi_thread")]
async fn listener_rejects_unknown_protocol() {
    let listener = NegotiationListener::bind(
        loopback(),
        amqp_only_chain(),
        ListenerSettings::default(),
    )
    .await
    .expect("绑定监听器");
    let target = listener.local_addr().to_std();

    let accept = tokio::spawn(async move { listener.accept_one().await });

    let mut client = tokio::net::TcpStream::connect(target).await.expect("建连");
    let unknown = ProtocolHeader::new(ProtocolId::Unknown(0x7f), ProtocolVersion::V1_0_0);
    client.write_all(&unknown.encode()).await.expect("写入协议头");

    let mut reply = [0u8; PROTOCOL_HEADER_SIZE];
    client.read_exact(&mut reply).await.expect("读取回写头部");
    assert_eq!(
        ProtocolHeader::decode(&reply).expect("解码回写头部"),
        AMQP_HEADER,
        "回写的应是终端协议的默认头部"
    );

    let err = accept
        .await
        .expect("接受任务崩溃")
        .expect_err("未知协议不得上交");
    assert_eq!(err.category(), ErrorCategory::Negotiation);
}

/// 要求加密的准入策略拒绝从未升级的明文终端连接。
#[tokio::test(flavor = "multi_thread")]
async fn admission_rejects_plain_connection_when_secure_required() {
    let (_, listener_chain) = tls_chains();
    let settings = ListenerSettings::default()
        .with_admission(AdmissionPolicy::new().with_require_secure_transport(true));
    let listener = NegotiationListener::bind(loopback(), listener_chain, settings)
        .await
        .expect("绑定监听器");
    let target = listener.local_addr().to_std();

    let accept = tokio::spawn(async move { listener.accept_one().await });

    // 对端跳过 TLS 直接请求终端协议。
    let mut client = tokio::net::TcpStream::connect(target).await.expect("建连");
    client
        .write_all(&AMQP_HEADER.encode())
        .await
        .expect("写入协议头");

    let mut reply = [0u8; PROTOCOL_HEADER_SIZE];
    client.read_exact(&mut reply).await.expect("读取提示头部");
    assert_eq!(
        ProtocolHeader::decode(&reply).expect("解码提示头部"),
        TLS_HEADER,
        "拒绝时应提示对端先行 TLS 升级"
    );

    let err = accept
        .await
        .expect("接受任务崩溃")
        .expect_err("明文连接不得通过加密准入");
    assert_eq!(err.category(), ErrorCategory::Security);
}

/// 停滞对端受固定握手超时约束，不会无限占用处理槽位。
#[tokio::test(flavor = "multi_thread")]
async fn stalled_peer_hits_handshake_timeout() {
    let settings =
        ListenerSettings::default().with_handshake_timeout(Duration::from_millis(200));
    let listener = NegotiationListener::bind(loopback(), amqp_only_chain(), settings)
        .await
        .expect("绑定监听器");
    let target = listener.local_addr().to_std();

    let accept = tokio::spawn(async move { listener.accept_one().await });

    // 建连后保持沉默。
    let _client = tokio::net::TcpStream::connect(target).await.expect("建连");
    let err = accept
        .await
        .expect("接受任务崩溃")
        .expect_err("停滞对端必须超时");
    assert_eq!(err.category(), ErrorCategory::Timeout);
}

/// 接受循环并发协商多条连接；关停句柄使循环干净退出。
#[tokio::test(flavor = "multi_thread")]
async fn run_loop_negotiates_concurrently_and_shuts_down() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let (initiator_chain, listener_chain) = tls_chains();
    let listener =
        NegotiationListener::bind(loopback(), listener_chain, ListenerSettings::default())
            .await
            .expect("绑定监听器");
    let target = listener.local_addr();
    let shutdown = listener.shutdown_handle();

    let (sink, mut accepted_rx) = tokio::sync::mpsc::channel(8);
    let run = tokio::spawn(async move { listener.run(sink).await });

    const CLIENTS: usize = 3;
    let mut clients = Vec::new();
    for _ in 0..CLIENTS {
        let chain = Arc::clone(&initiator_chain);
        clients.push(tokio::spawn(async move {
            let established = TransportInitiator::new(chain, target)
                .connect(&ctx())
                .await
                .expect("发起端协商");
            // 完成终端头部交付，令监听端处理器结束循环。
            established
                .transport
                .write(
                    &ctx(),
                    &[Bytes::copy_from_slice(&AMQP_HEADER.encode())],
                )
                .await
                .expect("写入终端头部");
            established.transport.flush(&ctx()).await.expect("刷新");
            established
        }));
    }

    let mut accepted = Vec::new();
    for _ in 0..CLIENTS {
        let connection = accepted_rx.recv().await.expect("接受循环提前退出");
        assert!(connection.transport.security().is_secure());
        assert_eq!(connection.header, AMQP_HEADER);
        accepted.push(connection);
    }
    for client in clients {
        client.await.expect("客户端任务崩溃");
    }

    shutdown.cancel();
    run.await
        .expect("接受循环崩溃")
        .expect("关停应以 Ok 退出");
}
