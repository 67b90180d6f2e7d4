use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::PlController;
use crate::config::PlcConfig;
use crate::error::{Result, RevtrError};
use crate::lifecycle::{HealthSweep, SshShell, VpLifecycle};
use crate::rpc::RpcServer;
use crate::scamper::{ManagedProcess, Registry};
use crate::spoof::{ControllerSender, Correlator, CorrelatorConfig};
use crate::store;
use crate::telemetry::{init_metrics, start_observability_server, Readiness};
use crate::tls::build_acceptor;
use crate::watcher::{clean_dir, SocketWatcher};

/// Runs the PL-Controller until `shutdown` fires or the RPC server fails.
pub async fn run(cfg: PlcConfig, shutdown: CancellationToken) -> Result<()> {
    let registry = Arc::new(Registry::new());
    let mut tasks = JoinSet::new();

    let metrics = match cfg.telemetry.metrics_port {
        Some(port) => {
            let (metrics, prom) = init_metrics("plcontroller")
                .map_err(|e| RevtrError::Config(format!("Failed to initialise metrics: {e}")))?;
            let ready_registry = registry.clone();
            let readiness: Readiness = Arc::new(move || {
                if ready_registry.is_empty() {
                    Err("no vantage points connected")
                } else {
                    Ok(())
                }
            });
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

    std::fs::create_dir_all(&cfg.socket_dir)?;
    clean_dir(&cfg.socket_dir)?;
    let store = store::open(&cfg.store)?;

    if cfg.scamper.start {
        let daemon = ManagedProcess::controller_daemon(&cfg.scamper, &cfg.socket_dir);
        let token = shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = daemon.run(token).await {
                error!(error = %e, "probe daemon supervision ended");
            }
        });
    }

    let watcher = Arc::new(SocketWatcher::new(&cfg.socket_dir)?);
    let lifecycle =
        Arc::new(VpLifecycle::new(registry.clone(), store.clone(), cfg.local_addr, metrics.clone()));
    {
        let watcher = watcher.clone();
        let lifecycle = lifecycle.clone();
        let token = shutdown.clone();
        tasks.spawn(async move { lifecycle.run(&watcher, token).await });
    }

    let sender = ControllerSender::from_config(&cfg.tls, &cfg.spoof)?;
    let (correlator, correlator_task) =
        Correlator::spawn(sender, CorrelatorConfig::from(&cfg.spoof), metrics.clone());

    if cfg.health.enabled {
        let sweep = HealthSweep::new(
            SshShell::new(&cfg.health)?,
            store.clone(),
            Duration::from_secs(cfg.health.interval_secs),
            cfg.health.update_url.clone(),
            metrics.clone(),
        );
        let token = shutdown.clone();
        tasks.spawn(async move { sweep.run(token).await });
    }

    let plc = PlController::new(
        registry.clone(),
        store.clone(),
        correlator.clone(),
        Duration::from_secs(cfg.timeout_secs),
        metrics.clone(),
    );
    let acceptor = build_acceptor(&cfg.tls)?;
    let listener = TcpListener::bind(cfg.listen).await?;
    info!(listen = %cfg.listen, local = %cfg.local_addr, socket_dir = %cfg.socket_dir.display(), "PL-Controller started");

    let server = RpcServer::new(Arc::new(plc), acceptor, metrics);
    let served = server.serve(listener, shutdown.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "RPC server failed");
    }

    info!("shutting down");
    shutdown.cancel();
    correlator.quit().await;
    if let Err(e) = correlator_task.await {
        warn!(error = %e, "correlator task failed");
    }
    lifecycle.release_all();
    watcher.close();
    registry.stop_all();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "background task failed");
        }
    }
    if let Err(e) = store.close() {
        warn!(error = %e, "failed to close store");
    }
    if let Err(e) = clean_dir(&cfg.socket_dir) {
        warn!(error = %e, "failed to clean socket directory");
    }
    info!("PL-Controller stopped");
    served
}
