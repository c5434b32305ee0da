use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::Arc;
use thiserror::Error;

/// TLS 配置装配阶段的错误。
///
/// 装配发生在进程启动或证书轮换时，与连接期错误分开建模，调用方可在
/// 启动阶段快速失败而不污染传输错误码空间。
#[derive(Debug, Error)]
pub enum TlsConfigError {
    /// 证书链为空。
    #[error("certificate chain is empty")]
    EmptyCertificateChain,
    /// 客户端证书校验器装配失败。
    #[error("client certificate verifier: {0}")]
    ClientVerifier(String),
    /// rustls 拒绝了给定材料。
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// 以单一证书链与私钥装配服务端配置。
///
/// # 契约说明（What）
/// - `chain`：叶子证书在前的 DER 证书链，不得为空；
/// - `key`：与叶子证书匹配的私钥；
/// - `client_roots`：为 `Some` 时要求并校验客户端证书（双向认证），
///   为 `None` 时不请求客户端证书。
pub fn server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_roots: Option<RootCertStore>,
) -> Result<Arc<ServerConfig>, TlsConfigError> {
    if chain.is_empty() {
        return Err(TlsConfigError::EmptyCertificateChain);
    }
    let builder = match client_roots {
        Some(roots) => {
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|err| TlsConfigError::ClientVerifier(err.to_string()))?;
            ServerConfig::builder().with_client_cert_verifier(verifier)
        }
        None => ServerConfig::builder().with_no_client_auth(),
    };
    Ok(Arc::new(builder.with_single_cert(chain, key)?))
}

/// 以信任根装配客户端配置；`client_identity` 为 `Some` 时出示客户端证书。
pub fn client_config(
    roots: RootCertStore,
    client_identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
) -> Result<Arc<ClientConfig>, TlsConfigError> {
    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match client_identity {
        Some((chain, key)) => {
            if chain.is_empty() {
                return Err(TlsConfigError::EmptyCertificateChain);
            }
            builder.with_client_auth_cert(chain, key)?
        }
        None => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}
