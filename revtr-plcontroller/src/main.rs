#![forbid(unsafe_code)]

use clap::Parser;
use revtr_lib::config::{read_plc_config, validate_plc_config, PlcConfig, PlcOverrides};
use revtr_lib::telemetry::init_tracing;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "PL-Controller: runs measurements on connected vantage points")]
struct Cli {
    /// Path to configuration file (YAML, or TOML with a .toml extension)
    #[arg(short, long, value_name = "FILE", env = "PLC_CONFIG")]
    config: Option<PathBuf>,
    /// RPC listen address
    #[arg(long, env = "PLC_LISTEN")]
    listen: Option<SocketAddr>,
    /// Address recorded as owner of connected vantage points
    #[arg(long, env = "PLC_LOCAL_ADDR")]
    local_addr: Option<Ipv4Addr>,
    /// Default measurement timeout in seconds
    #[arg(long, env = "PLC_TIMEOUT")]
    timeout: Option<u64>,
    #[arg(long, env = "PLC_SOCKET_DIR")]
    socket_dir: Option<PathBuf>,
    #[arg(long, env = "PLC_SCAMPER_PORT")]
    scamper_port: Option<u16>,
    #[arg(long, env = "PLC_SCAMPER_BIN")]
    scamper_bin: Option<PathBuf>,
    /// Start and supervise the probe daemon
    #[arg(long, env = "PLC_START_SCAMPER")]
    start_scamper: Option<bool>,
    #[arg(long, env = "PLC_CERT_FILE")]
    cert_file: Option<String>,
    #[arg(long, env = "PLC_KEY_FILE")]
    key_file: Option<String>,
    #[arg(long, env = "PLC_ROOT_CA")]
    root_ca: Option<String>,
    /// SSH key used by the vantage point health sweep
    #[arg(long, env = "PLC_SSHKEY_PATH")]
    sshkey_path: Option<PathBuf>,
    /// SSH user for the health sweep
    #[arg(long, env = "PLC_PLUNAME")]
    pluname: Option<String>,
    #[arg(long, env = "PLC_UPDATE_URL")]
    update_url: Option<String>,
    /// Persist vantage points to this JSON file
    #[arg(long, env = "PLC_STORE_PATH")]
    store_path: Option<PathBuf>,
    #[arg(long, env = "PLC_METRICS_PORT")]
    metrics_port: Option<u16>,
    #[arg(long, env = "PLC_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn into_parts(self) -> (Option<PathBuf>, PlcOverrides) {
        let overrides = PlcOverrides {
            listen: self.listen,
            local_addr: self.local_addr,
            timeout_secs: self.timeout,
            socket_dir: self.socket_dir,
            scamper_port: self.scamper_port,
            scamper_bin: self.scamper_bin,
            start_scamper: self.start_scamper,
            cert_file: self.cert_file,
            key_file: self.key_file,
            root_ca: self.root_ca,
            sshkey_path: self.sshkey_path,
            pluname: self.pluname,
            update_url: self.update_url,
            store_path: self.store_path,
            metrics_port: self.metrics_port,
            log_level: self.log_level,
        };
        (self.config, overrides)
    }
}

fn load(cli: Cli) -> revtr_lib::Result<PlcConfig> {
    let (path, overrides) = cli.into_parts();
    let mut cfg = match path {
        Some(path) => read_plc_config(path)?,
        None => PlcConfig::default(),
    };
    overrides.apply(&mut cfg);
    validate_plc_config(&cfg)?;
    Ok(cfg)
}

async fn wait_for_signal(token: CancellationToken) {
    let (mut sigterm, mut sigint) = match (
        signal::unix::signal(signal::unix::SignalKind::terminate()),
        signal::unix::signal(signal::unix::SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "failed to install signal handlers");
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}

#[tokio::main]
async fn main() {
    let cfg = match load(Cli::parse()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = init_tracing(&cfg.logging, &cfg.telemetry) {
        eprintln!("failed to initialise logging: {err}");
        std::process::exit(1);
    }
    info!(listen = %cfg.listen, socket_dir = %cfg.socket_dir.display(), "configuration loaded");

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    if let Err(err) = revtr_lib::plcontroller::run(cfg, shutdown).await {
        error!(%err, "PL-Controller exited with error");
        std::process::exit(1);
    }
}
