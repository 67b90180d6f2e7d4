//! Socket directory watching and the vantage point lifecycle it drives.

mod helpers;

use helpers::{preamble, socket_path, TestResult};
use revtr_lib::lifecycle::VpLifecycle;
use revtr_lib::store::{MemoryVpStore, VpStore};
use revtr_lib::watcher::clean_dir;
use revtr_lib::{Registry, RevtrError, SocketEvent, SocketWatcher};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

const VP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const OTHER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) -> TestResult {
    for _ in 0..100 {
        if cond() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err(format!("timed out waiting for {what}").into())
}

#[tokio::test]
async fn test_watcher_reports_create_and_remove() -> TestResult {
    let dir = tempfile::tempdir()?;
    let watcher = SocketWatcher::new(dir.path())?;
    let quit = CancellationToken::new();

    let path = dir.path().join("10.0.0.1:4381");
    std::fs::write(&path, b"")?;
    let ev = tokio::time::timeout(Duration::from_secs(5), watcher.get_event(&quit)).await??;
    assert_eq!(ev, SocketEvent::Create(path.clone()));

    std::fs::remove_file(&path)?;
    loop {
        let ev = tokio::time::timeout(Duration::from_secs(5), watcher.get_event(&quit)).await??;
        if let SocketEvent::Remove(p) = ev {
            assert_eq!(p, path);
            break;
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_watcher_quit_and_close() -> TestResult {
    let dir = tempfile::tempdir()?;
    let watcher = SocketWatcher::new(dir.path())?;

    let quit = CancellationToken::new();
    quit.cancel();
    assert!(matches!(watcher.get_event(&quit).await, Err(RevtrError::Cancelled)));

    watcher.close();
    watcher.close();
    assert!(matches!(
        watcher.get_event(&CancellationToken::new()).await,
        Err(RevtrError::WatcherClosed)
    ));
    Ok(())
}

#[tokio::test]
async fn test_watching_missing_dir_fails() -> TestResult {
    let dir = tempfile::tempdir()?;
    let res = SocketWatcher::new(&dir.path().join("missing"));
    assert!(matches!(res, Err(RevtrError::Watch(_))));
    Ok(())
}

#[test]
fn test_clean_dir_empties_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("10.0.0.1:4381"), b"")?;
    std::fs::create_dir(dir.path().join("nested"))?;
    clean_dir(dir.path())?;
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

    clean_dir(&dir.path().join("missing"))?;
    clean_dir(&dir.path().join("missing").join("deeper"))?;
    Ok(())
}

#[tokio::test]
async fn test_socket_lifecycle_claims_and_releases() -> TestResult {
    let dir = tempfile::tempdir()?;
    let registry = Arc::new(Registry::new());
    let store = Arc::new(MemoryVpStore::new());
    let lifecycle = Arc::new(VpLifecycle::new(registry.clone(), store.clone(), LOCAL, None));
    let watcher = Arc::new(SocketWatcher::new(dir.path())?);
    let shutdown = CancellationToken::new();

    let task = {
        let (lifecycle, watcher, shutdown) = (lifecycle.clone(), watcher.clone(), shutdown.clone());
        tokio::spawn(async move { lifecycle.run(&watcher, shutdown).await })
    };

    // the probe daemon creates one socket per connected vantage point
    let path = socket_path(dir.path(), VP);
    let listener = UnixListener::bind(&path)?;
    let (mut conn, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept()).await??;
    conn.write_all(&preamble()).await?;

    wait_until("session registration", || registry.len() == 1).await?;
    assert_eq!(store.get_active_vps()?.first().and_then(|vp| vp.controller), Some(LOCAL));

    std::fs::remove_file(&path)?;
    wait_until("session removal", || registry.is_empty()).await?;
    assert!(store.get_active_vps()?.is_empty());

    shutdown.cancel();
    task.await?;
    Ok(())
}

#[tokio::test]
async fn test_foreign_owned_vp_still_gets_a_session() -> TestResult {
    let dir = tempfile::tempdir()?;
    let registry = Arc::new(Registry::new());
    let store = Arc::new(MemoryVpStore::new());
    store.update_controller(VP, Some(OTHER), OTHER)?;
    let lifecycle = VpLifecycle::new(registry.clone(), store.clone(), LOCAL, None);

    let path = socket_path(dir.path(), VP);
    let _listener = UnixListener::bind(&path)?;
    lifecycle.on_create(&path).await?;
    assert_eq!(registry.len(), 1);
    assert_eq!(store.get_vps()?[0].controller, Some(OTHER));

    lifecycle.release_all();
    assert_eq!(store.get_vps()?[0].controller, Some(OTHER), "release is owner-checked");
    Ok(())
}

#[tokio::test]
async fn test_bad_socket_name_is_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let lifecycle =
        VpLifecycle::new(Arc::new(Registry::new()), Arc::new(MemoryVpStore::new()), LOCAL, None);
    let res = lifecycle.on_create(&dir.path().join("not-a-socket")).await;
    assert!(matches!(res, Err(RevtrError::InvalidSocketName(_))));
    Ok(())
}
