use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::batcher::{Batcher, PlcSink};
use super::monitor::ProbeMonitor;
use crate::config::VpConfig;
use crate::error::{Result, RevtrError};
use crate::rpc::RpcClient;
use crate::scamper::ManagedProcess;
use crate::telemetry::{init_metrics, start_observability_server, Readiness};
use crate::tls::build_connector;

const PROBE_QUEUE: usize = 4096;

/// Runs the vantage point agent until `shutdown` fires.
pub async fn run(cfg: VpConfig, shutdown: CancellationToken) -> Result<()> {
    let mut tasks = JoinSet::new();

    let metrics = match cfg.telemetry.metrics_port {
        Some(port) => {
            let (metrics, prom) = init_metrics("plvp")
                .map_err(|e| RevtrError::Config(format!("Failed to initialise metrics: {e}")))?;
            let readiness: Readiness = Arc::new(|| Ok(()));
            let token = shutdown.clone();
            tasks.spawn(async move {
                if let Err(e) = start_observability_server(port, prom, readiness, token).await {
                    error!(error = %e, "observability server failed");
                }
            });
            Some(metrics)
        }
        None => None,
    };

    if cfg.scamper.start {
        let daemon = ManagedProcess::vp_daemon(&cfg.scamper, &cfg.plcontroller.host);
        let token = shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = daemon.run(token).await {
                error!(error = %e, "probe daemon supervision ended");
            }
        });
    }

    let addr = format!("{}:{}", cfg.plcontroller.host, cfg.plcontroller.rpc_port);
    let client = RpcClient::new(build_connector(&cfg.tls)?, addr, &cfg.tls.server_name)?;
    info!(plcontroller = client.addr(), local = %cfg.local_addr, "vantage point agent started");

    let (tx, rx) = mpsc::channel(PROBE_QUEUE);
    let monitor = Arc::new(ProbeMonitor::new(
        cfg.local_addr,
        Duration::from_millis(cfg.monitor.backoff_max_ms),
        metrics.clone(),
    ));
    {
        let monitor = monitor.clone();
        let token = shutdown.clone();
        tasks.spawn(async move { monitor.run(tx, token).await });
    }

    let batcher = Batcher::new(
        PlcSink::new(client),
        Duration::from_millis(cfg.monitor.flush_interval_ms),
        metrics,
    );
    batcher.run(rx, shutdown.clone()).await;

    shutdown.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "background task failed");
        }
    }
    info!(captured = monitor.captured(), "vantage point agent stopped");
    Ok(())
}
