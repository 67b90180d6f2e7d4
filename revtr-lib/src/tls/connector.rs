use rustls_pki_types::ServerName;
use std::sync::Arc;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use super::{load_certs, load_key, load_roots};
use crate::config::RpcTlsConfig;
use crate::error::{Result, RevtrError};

/// Builds a TLS connector presenting the configured client certificate and
/// trusting only the configured root CA.
pub fn build_connector(cfg: &RpcTlsConfig) -> Result<TlsConnector> {
    let roots = load_roots(&cfg.ca_path)?;
    let certs = load_certs(&cfg.cert_path)?;
    let key = load_key(&cfg.key_path)?;

    let client = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| RevtrError::Tls(format!("Failed to build TLS config: {e}")))?;

    Ok(TlsConnector::from(Arc::new(client)))
}

pub fn server_name(name: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(name.to_string())
        .map_err(|e| RevtrError::Tls(format!("Invalid server name {name}: {e}")))
}
