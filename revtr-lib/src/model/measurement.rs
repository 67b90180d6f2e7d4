use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A ping request.
///
/// String options are passed to the probe daemon verbatim; empty strings and
/// `false` flags are left off the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingMeasurement {
    /// Vantage point that sends the probes.
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// Seconds; 0 selects the controller default.
    pub timeout: u64,
    pub spoof: bool,
    /// Source address written into spoofed probes.
    pub saddr: Option<Ipv4Addr>,
    pub rr: bool,
    pub payload: String,
    pub count: String,
    pub icmp_sum: String,
    pub dport: String,
    pub sport: String,
    pub wait: String,
    pub ttl: String,
    pub mtu: String,
    pub reply_count: String,
    pub pattern: String,
    pub method: String,
    pub size: String,
    pub tos: String,
    pub timestamp: String,
    /// Correlation id carried in the payload of a spoofed probe.
    pub spoof_id: u32,
    /// Controller that receives the matching spoofed replies.
    pub controller: Option<Ipv4Addr>,
}

impl Default for PingMeasurement {
    fn default() -> Self {
        Self {
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            timeout: 0,
            spoof: false,
            saddr: None,
            rr: false,
            payload: String::new(),
            count: String::new(),
            icmp_sum: String::new(),
            dport: String::new(),
            sport: String::new(),
            wait: String::new(),
            ttl: String::new(),
            mtu: String::new(),
            reply_count: String::new(),
            pattern: String::new(),
            method: String::new(),
            size: String::new(),
            tos: String::new(),
            timestamp: String::new(),
            spoof_id: 0,
            controller: None,
        }
    }
}

/// A traceroute request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerouteMeasurement {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// Seconds; 0 selects the controller default.
    pub timeout: u64,
    pub confidence: String,
    pub dport: String,
    pub first_hop: String,
    pub gap_limit: String,
    pub gap_action: String,
    pub loops: String,
    pub max_ttl: String,
    pub path_discovery: bool,
    pub method: String,
    pub attempts: String,
    pub all_attempts: bool,
    pub sport: String,
    pub saddr: String,
    pub tos: String,
    pub wait: String,
    pub wait_probe: String,
}

impl Default for TracerouteMeasurement {
    fn default() -> Self {
        Self {
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            timeout: 0,
            confidence: String::new(),
            dport: String::new(),
            first_hop: String::new(),
            gap_limit: String::new(),
            gap_action: String::new(),
            loops: String::new(),
            max_ttl: String::new(),
            path_discovery: false,
            method: String::new(),
            attempts: String::new(),
            all_attempts: false,
            sport: String::new(),
            saddr: String::new(),
            tos: String::new(),
            wait: String::new(),
            wait_probe: String::new(),
        }
    }
}
