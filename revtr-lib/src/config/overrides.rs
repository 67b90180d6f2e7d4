use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::config::{PlcConfig, VpConfig};

/// Values supplied on the command line or through the environment.
///
/// Every field left `None` keeps the value loaded from the config file.
#[derive(Debug, Clone, Default)]
pub struct PlcOverrides {
    pub listen: Option<SocketAddr>,
    pub local_addr: Option<Ipv4Addr>,
    pub timeout_secs: Option<u64>,
    pub socket_dir: Option<PathBuf>,
    pub scamper_port: Option<u16>,
    pub scamper_bin: Option<PathBuf>,
    pub start_scamper: Option<bool>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub root_ca: Option<String>,
    pub sshkey_path: Option<PathBuf>,
    pub pluname: Option<String>,
    pub update_url: Option<String>,
    pub store_path: Option<PathBuf>,
    pub metrics_port: Option<u16>,
    pub log_level: Option<String>,
}

impl PlcOverrides {
    pub fn apply(self, cfg: &mut PlcConfig) {
        set(&mut cfg.listen, self.listen);
        set(&mut cfg.local_addr, self.local_addr);
        set(&mut cfg.timeout_secs, self.timeout_secs);
        set(&mut cfg.socket_dir, self.socket_dir);
        set(&mut cfg.scamper.port, self.scamper_port);
        set(&mut cfg.scamper.binary, self.scamper_bin);
        set(&mut cfg.scamper.start, self.start_scamper);
        set(&mut cfg.tls.cert_path, self.cert_file);
        set(&mut cfg.tls.key_path, self.key_file);
        set(&mut cfg.tls.ca_path, self.root_ca);
        set(&mut cfg.health.ssh_user, self.pluname);
        set(&mut cfg.health.update_url, self.update_url);
        set(&mut cfg.logging.level, self.log_level);
        if self.sshkey_path.is_some() {
            cfg.health.ssh_key_path = self.sshkey_path;
        }
        if self.store_path.is_some() {
            cfg.store.path = self.store_path;
        }
        if self.metrics_port.is_some() {
            cfg.telemetry.metrics_port = self.metrics_port;
        }
    }
}

/// Command line and environment values for the vantage point agent.
#[derive(Debug, Clone, Default)]
pub struct VpOverrides {
    pub local_addr: Option<Ipv4Addr>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scamper_port: Option<u16>,
    pub scamper_bin: Option<PathBuf>,
    pub start_scamper: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub root_ca: Option<String>,
    pub metrics_port: Option<u16>,
    pub log_level: Option<String>,
}

impl VpOverrides {
    pub fn apply(self, cfg: &mut VpConfig) {
        set(&mut cfg.local_addr, self.local_addr);
        set(&mut cfg.plcontroller.host, self.host);
        set(&mut cfg.plcontroller.rpc_port, self.port);
        set(&mut cfg.scamper.port, self.scamper_port);
        set(&mut cfg.scamper.binary, self.scamper_bin);
        set(&mut cfg.scamper.start, self.start_scamper);
        set(&mut cfg.tls.cert_path, self.cert_path);
        set(&mut cfg.tls.key_path, self.key_path);
        set(&mut cfg.tls.ca_path, self.root_ca);
        set(&mut cfg.logging.level, self.log_level);
        if self.metrics_port.is_some() {
            cfg.telemetry.metrics_port = self.metrics_port;
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}
