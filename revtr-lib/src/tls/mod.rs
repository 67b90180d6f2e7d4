//! Mutually authenticated TLS for the RPC transport.

mod acceptor;
mod connector;

pub use acceptor::build_acceptor;
pub use connector::{build_connector, server_name};

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::RootCertStore;

use crate::error::{Result, RevtrError};

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let bytes = std::fs::read(path)
        .map_err(|e| RevtrError::Tls(format!("Failed to read certificate [{path}]: {e}")))?;
    let certs = CertificateDer::pem_slice_iter(&bytes)
        .collect::<std::result::Result<Vec<_>, rustls_pki_types::pem::Error>>()
        .map_err(|e| RevtrError::Tls(format!("Failed to parse certificates: {e}")))?;
    if certs.is_empty() {
        return Err(RevtrError::Tls(format!("No certificates found in {path}")));
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let bytes = std::fs::read(path)
        .map_err(|e| RevtrError::Tls(format!("Failed to read key [{path}]: {e}")))?;
    let mut keys: Vec<PrivateKeyDer<'static>> = PrivateKeyDer::pem_slice_iter(&bytes)
        .collect::<std::result::Result<Vec<_>, rustls_pki_types::pem::Error>>()
        .map_err(|e| RevtrError::Tls(format!("Failed to parse private key: {e}")))?;
    keys.pop().ok_or(RevtrError::NoPrivateKey)
}

fn load_roots(path: &str) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| RevtrError::Tls(format!("Invalid root certificate: {e}")))?;
    }
    Ok(roots)
}
