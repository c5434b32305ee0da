use std::fmt;

/// 对端身份：双向认证握手后附着在传输层上的凭据摘要。
///
/// # 契约说明（What）
/// - `certificate_der`：对端叶子证书的 DER 编码；准入策略据此完成
///   授权决策，本 crate 不解析证书内容；
/// - 身份对象不可变，随传输层生命周期存续。
#[derive(Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    certificate_der: Vec<u8>,
}

impl PeerIdentity {
    /// 以叶子证书 DER 构造身份。
    pub fn from_certificate_der(certificate_der: Vec<u8>) -> Self {
        Self { certificate_der }
    }

    /// 对端叶子证书的 DER 编码。
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 证书本体可能较大且含敏感信息，仅输出长度。
        f.debug_struct("PeerIdentity")
            .field("certificate_der_len", &self.certificate_der.len())
            .finish()
    }
}

/// 传输层的安全属性，升级发生时由外层传输声明。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 准入策略需要在不感知具体协议实现的情况下回答两个问题：链路是否
///   加密、对端是否通过了双向认证。把答案收敛为一个小枚举，监听端的
///   策略检查就是一次模式匹配；
/// - `#[non_exhaustive]` 为将来的安全分层（如 SASL 外层）预留变体。
///
/// ## 契约（What）
/// - `None`：明文链路；
/// - `Tls`：加密链路；`peer_identity` 仅在请求了双向认证且对端出示了
///   有效证书时为 `Some`。
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// 明文链路。
    #[default]
    None,
    /// TLS 加密链路。
    Tls {
        /// 双向认证通过后附着的对端身份。
        peer_identity: Option<PeerIdentity>,
    },
}

impl TransportSecurity {
    /// 链路是否加密。
    pub fn is_secure(&self) -> bool {
        !matches!(self, TransportSecurity::None)
    }

    /// 对端身份（若经过双向认证）。
    pub fn peer_identity(&self) -> Option<&PeerIdentity> {
        match self {
            TransportSecurity::Tls { peer_identity } => peer_identity.as_ref(),
            _ => None,
        }
    }
}
