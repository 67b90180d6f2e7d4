use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::tls::RpcTlsConfig;

/// Probe-daemon process configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ScamperConfig {
    /// Path to the probe-daemon binary
    /// Default: "/usr/local/bin/scamper"
    #[serde(default = "default_scamper_binary")]
    pub binary: PathBuf,
    /// Port the daemon listens on (controller) or connects to (vantage point)
    /// Default: 4381
    #[serde(default = "default_scamper_port")]
    pub port: u16,
    /// Start and supervise the daemon from this process
    /// Default: false
    #[serde(default)]
    pub start: bool,
    /// Delay before restarting a daemon that exited, in milliseconds
    /// Default: 2000
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Restarts allowed before giving up
    /// Default: 10
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

impl Default for ScamperConfig {
    fn default() -> Self {
        Self {
            binary: default_scamper_binary(),
            port: default_scamper_port(),
            start: false,
            restart_delay_ms: default_restart_delay_ms(),
            max_restarts: default_max_restarts(),
        }
    }
}

/// Periodic SSH health sweep of the vantage points
#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    /// Run the sweep at all
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between sweeps in seconds
    /// Default: 300 (5 minutes)
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    /// Wall-clock limit for a single remote command in seconds
    /// Default: 25
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// SSH connect timeout in seconds
    /// Default: 5
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Remote user name
    /// Default: "plvp"
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// Private key used for authentication; health checks fail without one
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,
    /// URL of the agent tarball installed on vantage points without the service
    /// Default: empty (install disabled)
    #[serde(default)]
    pub update_url: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval(),
            command_timeout_secs: default_command_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            ssh_user: default_ssh_user(),
            ssh_key_path: None,
            update_url: String::new(),
        }
    }
}

/// Spoofed probe correlation
#[derive(Debug, Deserialize, Clone)]
pub struct SpoofConfig {
    /// Interval between forwarding batches to controllers, in milliseconds
    /// Default: 2000
    #[serde(default = "default_flush_ms")]
    pub flush_interval_ms: u64,
    /// Lifetime of an unmatched registration in seconds
    /// Default: 60
    #[serde(default = "default_registration_ttl")]
    pub registration_ttl_secs: u64,
    /// RPC port peer controllers accept spoofed probes on
    /// Default: 4380
    #[serde(default = "default_controller_port")]
    pub controller_port: u16,
    /// Name controller certificates must be valid for
    /// Default: "plcontroller"
    #[serde(default = "default_controller_server_name")]
    pub controller_server_name: String,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_ms(),
            registration_ttl_secs: default_registration_ttl(),
            controller_port: default_controller_port(),
            controller_server_name: default_controller_server_name(),
        }
    }
}

/// Vantage point store
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// JSON file the store is persisted to
    /// Default: None (in-memory store)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// PL-Controller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PlcConfig {
    /// RPC listen address
    /// Default: "0.0.0.0:4380"
    #[serde(default = "default_plc_listen")]
    pub listen: SocketAddr,
    /// Address recorded as owner of the vantage points this controller serves
    /// Default: "127.0.0.1"
    #[serde(default = "default_local_addr")]
    pub local_addr: Ipv4Addr,
    /// Default measurement timeout in seconds, used when a request carries 0
    /// Default: 60
    #[serde(default = "default_measurement_timeout")]
    pub timeout_secs: u64,
    /// Directory the probe daemon creates per-vantage-point sockets in
    /// Default: "/tmp/scamper_sockets"
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
    #[serde(default)]
    pub scamper: ScamperConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub spoof: SpoofConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tls: RpcTlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            listen: default_plc_listen(),
            local_addr: default_local_addr(),
            timeout_secs: default_measurement_timeout(),
            socket_dir: default_socket_dir(),
            scamper: ScamperConfig::default(),
            health: HealthConfig::default(),
            spoof: SpoofConfig::default(),
            store: StoreConfig::default(),
            tls: RpcTlsConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Where a vantage point finds its PL-Controller
#[derive(Debug, Deserialize, Clone)]
pub struct PlcEndpoint {
    /// Host name or address of the PL-Controller
    /// Default: "127.0.0.1"
    #[serde(default = "default_plc_host")]
    pub host: String,
    /// RPC port of the PL-Controller
    /// Default: 4380
    #[serde(default = "default_plc_rpc_port")]
    pub rpc_port: u16,
}

impl Default for PlcEndpoint {
    fn default() -> Self {
        Self { host: default_plc_host(), rpc_port: default_plc_rpc_port() }
    }
}

/// Spoofed probe monitor on the vantage point
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Interval between batches sent to the PL-Controller, in milliseconds
    /// Default: 2000
    #[serde(default = "default_flush_ms")]
    pub flush_interval_ms: u64,
    /// Upper bound for the reconnect backoff, in milliseconds
    /// Default: 30000
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { flush_interval_ms: default_flush_ms(), backoff_max_ms: default_backoff_max_ms() }
    }
}

/// Vantage point agent configuration
#[derive(Debug, Deserialize, Clone)]
pub struct VpConfig {
    /// Address the raw ICMP socket binds to
    /// Default: "0.0.0.0"
    #[serde(default = "default_vp_addr")]
    pub local_addr: Ipv4Addr,
    #[serde(default)]
    pub plcontroller: PlcEndpoint,
    #[serde(default)]
    pub scamper: ScamperConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub tls: RpcTlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for VpConfig {
    fn default() -> Self {
        Self {
            local_addr: default_vp_addr(),
            plcontroller: PlcEndpoint::default(),
            scamper: ScamperConfig::default(),
            monitor: MonitorConfig::default(),
            tls: RpcTlsConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_scamper_binary() -> PathBuf {
    PathBuf::from("/usr/local/bin/scamper")
}

fn default_scamper_port() -> u16 {
    4381
}

fn default_restart_delay_ms() -> u64 {
    2000
}

fn default_max_restarts() -> u32 {
    10
}

fn default_health_interval() -> u64 {
    300
}

fn default_command_timeout() -> u64 {
    25
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_ssh_user() -> String {
    "plvp".to_string()
}

fn default_flush_ms() -> u64 {
    2000
}

fn default_registration_ttl() -> u64 {
    60
}

fn default_controller_port() -> u16 {
    4380
}

fn default_controller_server_name() -> String {
    "plcontroller".to_string()
}

fn default_plc_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4380))
}

fn default_local_addr() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_measurement_timeout() -> u64 {
    60
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from("/tmp/scamper_sockets")
}

fn default_plc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_plc_rpc_port() -> u16 {
    4380
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_vp_addr() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}
