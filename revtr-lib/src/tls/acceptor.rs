use std::sync::Arc;
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use super::{load_certs, load_key, load_roots};
use crate::config::RpcTlsConfig;
use crate::error::{Result, RevtrError};

/// Builds a TLS acceptor that requires clients to present a certificate
/// signed by the configured root CA.
pub fn build_acceptor(cfg: &RpcTlsConfig) -> Result<TlsAcceptor> {
    let certs = load_certs(&cfg.cert_path)?;
    let key = load_key(&cfg.key_path)?;
    let roots = load_roots(&cfg.ca_path)?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| RevtrError::Tls(format!("Failed to build client verifier: {e}")))?;

    let server = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| RevtrError::Tls(format!("Failed to build TLS config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(server)))
}
