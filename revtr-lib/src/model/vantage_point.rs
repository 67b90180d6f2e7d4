use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A remote host that runs the probe daemon and the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VantagePoint {
    pub ip: Ipv4Addr,
    /// Controller that currently owns the vantage point; `None` when unbound.
    #[serde(default)]
    pub controller: Option<Ipv4Addr>,
    #[serde(default)]
    pub hostname: String,
    /// SSH port used by the health sweep.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub timestamp: bool,
    #[serde(default)]
    pub record_route: bool,
    #[serde(default)]
    pub can_spoof: bool,
    #[serde(default)]
    pub receive_spoof: bool,
    #[serde(default)]
    pub active: bool,
    /// Unix seconds of the last ownership or status change.
    #[serde(default)]
    pub last_updated: u64,
    #[serde(default)]
    pub check_status: String,
}

impl VantagePoint {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            controller: None,
            hostname: ip.to_string(),
            port: default_ssh_port(),
            site: String::new(),
            timestamp: false,
            record_route: false,
            can_spoof: false,
            receive_spoof: false,
            active: false,
            last_updated: 0,
            check_status: String::new(),
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

/// Filter for `GetVPs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpRequest {
    /// Only return vantage points with a bound controller.
    #[serde(default)]
    pub active_only: bool,
}
