#![forbid(unsafe_code)]

use clap::Parser;
use revtr_lib::config::{read_vp_config, validate_vp_config, VpConfig, VpOverrides};
use revtr_lib::telemetry::init_tracing;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Vantage point agent: forwards replies to spoofed probes")]
struct Cli {
    /// Path to configuration file (YAML, or TOML with a .toml extension)
    #[arg(short, long, value_name = "FILE", env = "PLVP_CONFIG")]
    config: Option<PathBuf>,
    /// Address the raw ICMP socket binds to
    #[arg(long, env = "PLVP_LOCAL_ADDR")]
    local_addr: Option<Ipv4Addr>,
    /// PL-Controller host
    #[arg(long, env = "PLVP_HOST")]
    host: Option<String>,
    /// PL-Controller RPC port
    #[arg(long, env = "PLVP_PORT")]
    port: Option<u16>,
    #[arg(long, env = "PLVP_SCAMPER_PORT")]
    scamper_port: Option<u16>,
    #[arg(long, env = "PLVP_SCAMPER_BIN")]
    scamper_bin: Option<PathBuf>,
    /// Start and supervise the probe daemon
    #[arg(long, env = "PLVP_START_SCAMPER")]
    start_scamper: Option<bool>,
    #[arg(long, env = "PLVP_CERT_PATH")]
    cert_path: Option<String>,
    #[arg(long, env = "PLVP_KEY_PATH")]
    key_path: Option<String>,
    #[arg(long, env = "PLVP_ROOT_CA")]
    root_ca: Option<String>,
    #[arg(long, env = "PLVP_METRICS_PORT")]
    metrics_port: Option<u16>,
    #[arg(long, env = "PLVP_LOG_LEVEL")]
    log_level: Option<String>,
}

fn load(cli: Cli) -> revtr_lib::Result<VpConfig> {
    let mut cfg = match &cli.config {
        Some(path) => read_vp_config(path)?,
        None => VpConfig::default(),
    };
    VpOverrides {
        local_addr: cli.local_addr,
        host: cli.host,
        port: cli.port,
        scamper_port: cli.scamper_port,
        scamper_bin: cli.scamper_bin,
        start_scamper: cli.start_scamper,
        cert_path: cli.cert_path,
        key_path: cli.key_path,
        root_ca: cli.root_ca,
        metrics_port: cli.metrics_port,
        log_level: cli.log_level,
    }
    .apply(&mut cfg);
    validate_vp_config(&cfg)?;
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
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
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
    info!(plcontroller = %cfg.plcontroller.host, "configuration loaded");

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    if let Err(err) = revtr_lib::vp::run(cfg, shutdown).await {
        error!(%err, "vantage point agent exited with error");
        std::process::exit(1);
    }
}
