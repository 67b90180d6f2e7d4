use serde::Deserialize;

/// Mutual TLS material for the RPC transport
///
/// The same section configures both directions: a process serving RPC presents
/// `cert_path`/`key_path` and requires peers to present a certificate signed by
/// `ca_path`; a process calling RPC presents the same pair and verifies the
/// server against `ca_path` and `server_name`.
#[derive(Debug, Deserialize, Clone)]
pub struct RpcTlsConfig {
    /// Path to the certificate chain (PEM format)
    #[serde(default)]
    pub cert_path: String,
    /// Path to the private key (PEM format)
    #[serde(default)]
    pub key_path: String,
    /// Path to the root CA used to verify peers (PEM format)
    #[serde(default)]
    pub ca_path: String,
    /// Name the remote server certificate must be valid for
    /// Default: "plcontroller"
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl Default for RpcTlsConfig {
    fn default() -> Self {
        Self {
            cert_path: String::new(),
            key_path: String::new(),
            ca_path: String::new(),
            server_name: default_server_name(),
        }
    }
}

fn default_server_name() -> String {
    "plcontroller".to_string()
}
