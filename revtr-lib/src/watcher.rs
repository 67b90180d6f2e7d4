//! Watches the probe daemon's socket directory for vantage points coming
//! and going.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, RevtrError};

/// A socket file appearing or disappearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Create(PathBuf),
    Remove(PathBuf),
}

impl SocketEvent {
    pub fn path(&self) -> &Path {
        match self {
            SocketEvent::Create(p) | SocketEvent::Remove(p) => p,
        }
    }
}

pub struct SocketWatcher {
    dir: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<SocketEvent>>,
    closed: CancellationToken,
}

impl SocketWatcher {
    /// Starts watching `dir`, which must exist.
    pub fn new(dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "socket directory watch error");
                    return;
                }
            };
            let make: fn(PathBuf) -> SocketEvent = match event.kind {
                EventKind::Create(_) => SocketEvent::Create,
                EventKind::Remove(_) => SocketEvent::Remove,
                _ => return,
            };
            for path in event.paths {
                // receiver gone means the watcher is shutting down
                let _ = tx.send(make(path));
            }
        })
        .map_err(|e| RevtrError::Watch(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| RevtrError::Watch(format!("{}: {e}", dir.display())))?;
        debug!(dir = %dir.display(), "watching socket directory");

        Ok(Self {
            dir: dir.to_path_buf(),
            watcher: Mutex::new(Some(watcher)),
            events: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Waits for the next Create or Remove event.
    ///
    /// Returns `Cancelled` when `quit` fires and `WatcherClosed` once the
    /// watcher has been closed.
    pub async fn get_event(&self, quit: &CancellationToken) -> Result<SocketEvent> {
        if self.closed.is_cancelled() {
            return Err(RevtrError::WatcherClosed);
        }
        let mut events = self.events.lock().await;
        tokio::select! {
            _ = quit.cancelled() => Err(RevtrError::Cancelled),
            _ = self.closed.cancelled() => Err(RevtrError::WatcherClosed),
            ev = events.recv() => ev.ok_or(RevtrError::WatcherClosed),
        }
    }

    /// Stops watching. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
        let watcher = match self.watcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(watcher);
    }
}

/// Removes every entry of `dir`. A missing directory is not an error.
pub fn clean_dir(dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        let res = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = res {
            warn!(path = %path.display(), error = %e, "failed to remove stale socket");
        }
    }
    Ok(())
}
