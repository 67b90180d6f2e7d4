//! Keep-alive supervision of a locally started probe daemon.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ScamperConfig;
use crate::error::{Result, RevtrError};

/// A probe daemon restarted whenever it exits, until shutdown or until the
/// restart budget is spent.
#[derive(Debug, Clone)]
pub struct ManagedProcess {
    program: PathBuf,
    args: Vec<String>,
    restart_delay: Duration,
    max_restarts: u32,
}

impl ManagedProcess {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            restart_delay: Duration::from_secs(2),
            max_restarts: 10,
        }
    }

    pub fn with_restart_policy(mut self, delay: Duration, max_restarts: u32) -> Self {
        self.restart_delay = delay;
        self.max_restarts = max_restarts;
        self
    }

    /// Daemon serving remote vantage points through a socket directory.
    pub fn controller_daemon(cfg: &ScamperConfig, socket_dir: &Path) -> Self {
        let args = vec![
            "-4".to_string(),
            "-O".to_string(),
            "tka".to_string(),
            "-P".to_string(),
            cfg.port.to_string(),
            "-U".to_string(),
            socket_dir.display().to_string(),
        ];
        Self::new(&cfg.binary, args)
            .with_restart_policy(Duration::from_millis(cfg.restart_delay_ms), cfg.max_restarts)
    }

    /// Daemon on a vantage point, dialing out to the controller's daemon.
    pub fn vp_daemon(cfg: &ScamperConfig, host: &str) -> Self {
        let args = vec!["-R".to_string(), format!("{host}:{}", cfg.port)];
        Self::new(&cfg.binary, args)
            .with_restart_policy(Duration::from_millis(cfg.restart_delay_ms), cfg.max_restarts)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Runs the daemon until `shutdown` fires. Returns an error once the
    /// daemon has exited more than `max_restarts` times or cannot be spawned.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut restarts = 0u32;
        loop {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    RevtrError::Config(format!(
                        "Failed to start {}: {e}",
                        self.program.display()
                    ))
                })?;
            info!(program = %self.program.display(), pid = child.id(), args = ?self.args, "probe daemon started");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to stop probe daemon");
                    }
                    info!("probe daemon stopped");
                    return Ok(());
                }
                status = child.wait() => {
                    match status {
                        Ok(status) => warn!(%status, "probe daemon exited"),
                        Err(e) => warn!(error = %e, "failed to wait for probe daemon"),
                    }
                }
            }

            restarts += 1;
            if restarts > self.max_restarts {
                return Err(RevtrError::Config(format!(
                    "probe daemon exited {restarts} times, giving up"
                )));
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_arguments() {
        let cfg = ScamperConfig { port: 5000, ..ScamperConfig::default() };
        let p = ManagedProcess::controller_daemon(&cfg, Path::new("/tmp/socks"));
        assert_eq!(p.args().join(" "), "-4 -O tka -P 5000 -U /tmp/socks");
    }

    #[test]
    fn vp_arguments() {
        let p = ManagedProcess::vp_daemon(&ScamperConfig::default(), "plc.example.org");
        assert_eq!(p.args().join(" "), "-R plc.example.org:4381");
    }

    #[tokio::test]
    async fn gives_up_after_restart_budget() {
        let p = ManagedProcess::new("true", Vec::new())
            .with_restart_policy(Duration::from_millis(1), 2);
        let res = p.run(CancellationToken::new()).await;
        assert!(matches!(res, Err(RevtrError::Config(_))));
    }

    #[tokio::test]
    async fn shutdown_kills_daemon() {
        let p = ManagedProcess::new("sleep", vec!["30".to_string()]);
        let token = CancellationToken::new();
        let t = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            t.cancel();
        });
        let res = tokio::time::timeout(Duration::from_secs(5), p.run(token)).await;
        assert!(matches!(res, Ok(Ok(()))));
    }
}
