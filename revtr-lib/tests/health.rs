mod helpers;

use helpers::TestResult;
use revtr_lib::config::HealthConfig;
use revtr_lib::lifecycle::{
    check_vp, CommandOutput, HealthSweep, RemoteShell, SshShell, HEALTHY, RESTART, START, STATUS,
};
use revtr_lib::model::VantagePoint;
use revtr_lib::store::{MemoryVpStore, VpStore};
use revtr_lib::RevtrError;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PLC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

/// Answers the status command per vantage point and records every command.
#[derive(Clone, Default)]
struct ScriptedShell {
    status: Arc<HashMap<Ipv4Addr, CommandOutput>>,
    start_output: String,
    log: Arc<Mutex<Vec<(Ipv4Addr, String)>>>,
}

impl ScriptedShell {
    fn new(status: impl IntoIterator<Item = (Ipv4Addr, i32, &'static str)>) -> Self {
        let status = status
            .into_iter()
            .map(|(ip, code, stdout)| {
                (ip, CommandOutput { status: Some(code), stdout: stdout.to_string(), stderr: String::new() })
            })
            .collect();
        Self { status: Arc::new(status), ..Self::default() }
    }

    fn commands(&self, ip: Ipv4Addr) -> Vec<String> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().filter(|(vp, _)| *vp == ip).map(|(_, c)| c.clone()).collect()
    }
}

impl RemoteShell for ScriptedShell {
    async fn run(&self, vp: &VantagePoint, command: &str) -> revtr_lib::Result<CommandOutput> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((vp.ip, command.to_string()));
        if command == STATUS {
            return self
                .status
                .get(&vp.ip)
                .cloned()
                .ok_or_else(|| RevtrError::RemoteCommandFailed("connection refused".to_string()));
        }
        Ok(CommandOutput { status: Some(0), stdout: self.start_output.clone(), stderr: String::new() })
    }
}

fn vp(last: u8, controller: Option<Ipv4Addr>) -> VantagePoint {
    VantagePoint { controller, ..VantagePoint::new(Ipv4Addr::new(10, 0, 0, last)) }
}

#[tokio::test]
async fn test_running_and_bound_needs_nothing() -> TestResult {
    let target = vp(1, Some(PLC));
    let shell = ScriptedShell::new([(target.ip, 0, "plvp (pid 42) is running...")]);
    check_vp(&shell, &target, "").await?;
    assert_eq!(shell.commands(target.ip), vec![STATUS.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_running_but_unbound_is_restarted() -> TestResult {
    let target = vp(1, None);
    let shell = ScriptedShell::new([(target.ip, 0, "plvp (pid 42) is running...")]);
    check_vp(&shell, &target, "").await?;
    assert_eq!(shell.commands(target.ip), vec![STATUS.to_string(), RESTART.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_stopped_is_started() -> TestResult {
    let target = vp(1, None);
    let shell = ScriptedShell::new([(target.ip, 3, "plvp is stopped")]);
    check_vp(&shell, &target, "").await?;
    assert_eq!(shell.commands(target.ip), vec![STATUS.to_string(), START.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_dead_with_pid_is_restarted() -> TestResult {
    let target = vp(1, Some(PLC));
    let shell = ScriptedShell::new([(target.ip, 1, "plvp dead but pid file exists")]);
    check_vp(&shell, &target, "").await?;
    assert_eq!(shell.commands(target.ip).last().map(String::as_str), Some(RESTART));
    Ok(())
}

#[tokio::test]
async fn test_missing_service_is_installed_then_started() -> TestResult {
    let target = vp(1, None);
    let shell = ScriptedShell::new([(target.ip, 1, "plvp: unrecognized service")]);

    let res = check_vp(&shell, &target, "").await;
    assert!(matches!(res, Err(RevtrError::UnknownService(_))), "no update url configured");

    check_vp(&shell, &target, "https://example.org/plvp.tar.gz").await?;
    let cmds = shell.commands(target.ip);
    assert!(cmds.iter().any(|c| c.contains("https://example.org/plvp.tar.gz")));
    assert_eq!(cmds.last().map(String::as_str), Some(START));
    Ok(())
}

#[tokio::test]
async fn test_failed_start_is_reported() -> TestResult {
    let target = vp(1, None);
    let mut shell = ScriptedShell::new([(target.ip, 3, "plvp is stopped")]);
    shell.start_output = "Starting plvp: [FAILED]".to_string();
    let res = check_vp(&shell, &target, "").await;
    assert!(matches!(res, Err(RevtrError::RemoteCommandFailed(msg)) if msg.contains("FAILED")));
    Ok(())
}

#[tokio::test]
async fn test_sweep_records_status_for_every_vp() -> TestResult {
    let healthy = vp(1, Some(PLC));
    let broken = vp(2, Some(PLC));
    let unreachable = vp(3, None);
    let store = Arc::new(MemoryVpStore::with_vps([healthy.clone(), broken.clone(), unreachable.clone()]));
    let shell = ScriptedShell::new([
        (healthy.ip, 0, "plvp (pid 1) is running..."),
        (broken.ip, 0, "something unexpected"),
    ]);

    let sweep = HealthSweep::new(shell, store.clone(), Duration::from_secs(300), String::new(), None);
    let written = sweep.sweep(&CancellationToken::new()).await;
    assert_eq!(written, 3);

    let status: HashMap<Ipv4Addr, String> =
        store.get_vps()?.into_iter().map(|vp| (vp.ip, vp.check_status)).collect();
    assert_eq!(status[&healthy.ip], HEALTHY);
    assert!(status[&broken.ip].contains("unknown service status"));
    assert!(status[&unreachable.ip].contains("connection refused"));
    Ok(())
}

#[tokio::test]
async fn test_cancelled_sweep_writes_nothing() -> TestResult {
    let target = vp(1, Some(PLC));
    let store = Arc::new(MemoryVpStore::with_vps([target.clone()]));
    let shell = ScriptedShell::new([(target.ip, 0, "plvp (pid 1) is running...")]);
    let sweep = HealthSweep::new(shell, store.clone(), Duration::from_secs(300), String::new(), None);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    assert_eq!(sweep.sweep(&shutdown).await, 0);
    assert!(store.get_vps()?[0].check_status.is_empty());
    Ok(())
}

#[test]
fn test_ssh_shell_rejects_unreadable_key() -> TestResult {
    let dir = tempfile::tempdir()?;
    let key = dir.path().join("id_rsa");
    std::fs::write(&key, "not a private key")?;
    let cfg = HealthConfig { ssh_key_path: Some(key), ..HealthConfig::default() };
    assert!(matches!(SshShell::new(&cfg), Err(RevtrError::Config(_))));
    Ok(())
}

#[tokio::test]
async fn test_ssh_shell_without_key_fails_command() -> TestResult {
    let shell = SshShell::new(&HealthConfig::default())?;
    let result = shell.run(&vp(1, None), STATUS).await;
    assert!(matches!(result, Err(RevtrError::RemoteCommandFailed(_))));
    Ok(())
}
