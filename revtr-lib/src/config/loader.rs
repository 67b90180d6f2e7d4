use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::config::{PlcConfig, RpcTlsConfig, VpConfig};
use crate::error::{Result, RevtrError};

pub fn load_plc_config<P: AsRef<Path>>(p: P) -> Result<PlcConfig> {
    let cfg = read_plc_config(p)?;
    validate_plc_config(&cfg)?;
    Ok(cfg)
}

pub fn load_vp_config<P: AsRef<Path>>(p: P) -> Result<VpConfig> {
    let cfg = read_vp_config(p)?;
    validate_vp_config(&cfg)?;
    Ok(cfg)
}

/// Reads without validating, for callers that overlay more settings first.
pub fn read_plc_config<P: AsRef<Path>>(p: P) -> Result<PlcConfig> {
    read_config(p.as_ref())
}

pub fn read_vp_config<P: AsRef<Path>>(p: P) -> Result<VpConfig> {
    read_config(p.as_ref())
}

/// YAML unless the file name ends in `.toml`.
fn read_config<T: DeserializeOwned>(p: &Path) -> Result<T> {
    let txt = fs::read_to_string(p)
        .map_err(|e| RevtrError::Config(format!("Failed to read config file: {e}")))?;

    let is_toml = p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&txt).map_err(|e| RevtrError::Config(format!("Failed to parse config: {e}")))
    } else {
        serde_norway::from_str(&txt)
            .map_err(|e| RevtrError::Config(format!("Failed to parse config: {e}")))
    }
}

pub fn validate_plc_config(cfg: &PlcConfig) -> Result<()> {
    if cfg.timeout_secs == 0 {
        return Err(RevtrError::Config("timeout_secs must be greater than 0".to_string()));
    }
    if cfg.local_addr.is_unspecified() {
        return Err(RevtrError::Config("local_addr must be a concrete address".to_string()));
    }
    if cfg.health.interval_secs == 0 || cfg.health.command_timeout_secs == 0 {
        return Err(RevtrError::Config("health intervals must be greater than 0".to_string()));
    }
    if cfg.spoof.flush_interval_ms == 0 {
        return Err(RevtrError::Config(
            "spoof.flush_interval_ms must be greater than 0".to_string(),
        ));
    }
    if let Some(path) = &cfg.health.ssh_key_path {
        if !path.exists() {
            return Err(RevtrError::Config(format!(
                "SSH key file not found: {}",
                path.display()
            )));
        }
    }
    validate_tls(&cfg.tls)
}

pub fn validate_vp_config(cfg: &VpConfig) -> Result<()> {
    if cfg.plcontroller.host.is_empty() {
        return Err(RevtrError::Config("plcontroller.host must be set".to_string()));
    }
    if cfg.monitor.flush_interval_ms == 0 {
        return Err(RevtrError::Config(
            "monitor.flush_interval_ms must be greater than 0".to_string(),
        ));
    }
    validate_tls(&cfg.tls)
}

fn validate_tls(tls: &RpcTlsConfig) -> Result<()> {
    for (what, path) in
        [("Certificate", &tls.cert_path), ("Key", &tls.key_path), ("Root CA", &tls.ca_path)]
    {
        if path.is_empty() {
            return Err(RevtrError::Config(format!("{what} file not configured")));
        }
        if !Path::new(path).exists() {
            return Err(RevtrError::Config(format!("{what} file not found: {path}")));
        }
    }
    Ok(())
}
