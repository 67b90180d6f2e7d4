//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use revtr_lib::config::RpcTlsConfig;
use revtr_lib::uuencode;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Generate a temporary file path for testing
pub fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos();
    std::env::temp_dir().join(format!("revtr-test-{nanos}-{name}"))
}

/// Mutual TLS material: one CA, a server certificate valid for `plcontroller`
/// and `controller`, and a client certificate.
pub struct TlsFixture {
    pub dir: tempfile::TempDir,
    pub ca: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

impl TlsFixture {
    pub fn server_config(&self) -> RpcTlsConfig {
        RpcTlsConfig {
            cert_path: self.server_cert.display().to_string(),
            key_path: self.server_key.display().to_string(),
            ca_path: self.ca.display().to_string(),
            server_name: "plcontroller".to_string(),
        }
    }

    pub fn client_config(&self) -> RpcTlsConfig {
        RpcTlsConfig {
            cert_path: self.client_cert.display().to_string(),
            key_path: self.client_key.display().to_string(),
            ca_path: self.ca.display().to_string(),
            server_name: "plcontroller".to_string(),
        }
    }
}

/// Generate a CA and two leaf certificates signed by it using rcgen
pub fn create_tls_fixture() -> TestResult<TlsFixture> {
    let dir = tempfile::tempdir()?;

    let ca_key = rcgen::KeyPair::generate()?;
    let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new())?;
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "revtr test ca");
    let ca_cert = ca_params.self_signed(&ca_key)?;
    let issuer = rcgen::Issuer::new(ca_params, ca_key);

    let server_key = rcgen::KeyPair::generate()?;
    let server_params = rcgen::CertificateParams::new(vec![
        "plcontroller".to_string(),
        "controller".to_string(),
        "localhost".to_string(),
    ])?;
    let server_cert = server_params.signed_by(&server_key, &issuer)?;

    let client_key = rcgen::KeyPair::generate()?;
    let client_params = rcgen::CertificateParams::new(vec!["plvp".to_string()])?;
    let client_cert = client_params.signed_by(&client_key, &issuer)?;

    let write = |name: &str, pem: String| -> TestResult<PathBuf> {
        let path = dir.path().join(name);
        fs::write(&path, pem)?;
        Ok(path)
    };

    Ok(TlsFixture {
        ca: write("ca.crt", ca_cert.pem())?,
        server_cert: write("server.crt", server_cert.pem())?,
        server_key: write("server.key", server_key.serialize_pem())?,
        client_cert: write("client.crt", client_cert.pem())?,
        client_key: write("client.key", client_key.serialize_pem())?,
        dir,
    })
}

/// Flag block with the given 1-based ids set.
fn flags(ids: &[u8]) -> Vec<u8> {
    let max = ids.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![0];
    }
    let n = usize::from(max).div_ceil(7);
    let mut out = vec![0u8; n];
    for id in ids {
        out[usize::from(id - 1) / 7] |= 1 << ((id - 1) % 7);
    }
    for b in out.iter_mut().take(n - 1) {
        *b |= 0x80;
    }
    out
}

fn flagged(ids: &[u8], params: &[u8]) -> Vec<u8> {
    let mut out = flags(ids);
    out.extend_from_slice(&(params.len() as u16).to_be_bytes());
    out.extend_from_slice(params);
    out
}

fn addr(ip: Ipv4Addr) -> Vec<u8> {
    let mut out = vec![4, 1];
    out.extend_from_slice(&ip.octets());
    out
}

/// Wraps a record body in the 8-byte record header.
pub fn record(kind: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&0x1205u16.to_be_bytes());
    out.extend_from_slice(&kind.to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub fn list_record(name: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    body.push(0);
    record(0x01, &body)
}

pub fn cycle_start_record(start: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&start.to_be_bytes());
    body.push(0);
    record(0x02, &body)
}

/// A ping record with one reply per entry of `rtts_us`, each from `dst`.
pub fn ping_record(user_id: u32, src: Ipv4Addr, dst: Ipv4Addr, rtts_us: &[u32]) -> Vec<u8> {
    let mut params = Vec::new();
    // 5 start
    params.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    params.extend_from_slice(&0u32.to_be_bytes());
    // 14 reply count, 15 pings sent, 16 method (icmp-echo)
    params.extend_from_slice(&(rtts_us.len() as u16).to_be_bytes());
    params.extend_from_slice(&(rtts_us.len().max(1) as u16).to_be_bytes());
    params.push(0);
    // 19 user id, 20 src, 21 dst
    params.extend_from_slice(&user_id.to_be_bytes());
    params.extend_from_slice(&addr(src));
    params.extend_from_slice(&addr(dst));

    let mut body = flagged(&[5, 14, 15, 16, 19, 20, 21], &params);
    body.extend_from_slice(&(rtts_us.len() as u16).to_be_bytes());
    for rtt in rtts_us {
        let mut reply = Vec::new();
        // 3 reply ttl, 5 icmp echo reply, 6 rtt, 12 addr
        reply.push(54);
        reply.extend_from_slice(&0u16.to_be_bytes());
        reply.extend_from_slice(&rtt.to_be_bytes());
        reply.extend_from_slice(&addr(dst));
        body.extend_from_slice(&flagged(&[3, 5, 6, 12], &reply));
    }
    record(0x07, &body)
}

/// A traceroute record with no hops.
pub fn trace_record(user_id: u32, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let mut params = Vec::new();
    // 5 start, 6 stop reason (completed)
    params.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    params.extend_from_slice(&0u32.to_be_bytes());
    params.push(1);
    // 26 src, 27 dst, 28 user id
    params.extend_from_slice(&addr(src));
    params.extend_from_slice(&addr(dst));
    params.extend_from_slice(&user_id.to_be_bytes());

    let mut body = flagged(&[5, 6, 26, 27, 28], &params);
    // hop count, end-of-trace marker
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    record(0x06, &body)
}

/// Control-socket data block carrying `bytes`, as the daemon writes it.
pub fn data_block(bytes: &[u8]) -> Vec<u8> {
    let encoded = uuencode::encode(bytes);
    let mut out = format!("DATA {}\n", encoded.len()).into_bytes();
    out.extend_from_slice(&encoded);
    out
}

/// The two header blocks the daemon sends before any result.
pub fn preamble() -> Vec<u8> {
    let mut out = data_block(&list_record("default"));
    out.extend_from_slice(&data_block(&cycle_start_record(1_700_000_000)));
    out
}

/// Path whose file name follows the `<ip>:<port>` socket convention.
pub fn socket_path(dir: &Path, ip: Ipv4Addr) -> PathBuf {
    dir.join(format!("{ip}:4381"))
}

/// Extracts the `-U <id>` user id from a command line.
pub fn user_id_of(command: &str) -> Option<u32> {
    let mut parts = command.split_whitespace();
    while let Some(tok) = parts.next() {
        if tok == "-U" {
            return parts.next().and_then(|id| id.parse().ok());
        }
    }
    None
}
