use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, RevtrError};
use crate::scamper::{parse_socket_name, Registry, Session};
use crate::store::VpStore;
use crate::telemetry::Metrics;
use crate::watcher::{SocketEvent, SocketWatcher};

/// Applies socket directory events to the registry and the store.
pub struct VpLifecycle {
    registry: Arc<Registry>,
    store: Arc<dyn VpStore>,
    local: Ipv4Addr,
    metrics: Option<Arc<Metrics>>,
}

impl VpLifecycle {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn VpStore>,
        local: Ipv4Addr,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self { registry, store, local, metrics }
    }

    pub async fn handle_event(&self, event: &SocketEvent) -> Result<()> {
        match event {
            SocketEvent::Create(path) => self.on_create(path).await,
            SocketEvent::Remove(path) => self.on_remove(path),
        }
    }

    /// Opens a session on a new socket and claims the vantage point.
    pub async fn on_create(&self, path: &Path) -> Result<()> {
        let (ip, _) = parse_socket_name(path)?;
        let session = Session::connect(path, self.metrics.clone()).await?;
        match self.store.update_controller(ip, Some(self.local), self.local) {
            Ok(claimed) => {
                if !claimed {
                    warn!(vp = %ip, "vantage point is owned by another controller");
                }
                self.registry.add(session);
                info!(vp = %ip, sessions = self.registry.len(), "vantage point connected");
                Ok(())
            }
            Err(e) => {
                session.stop();
                Err(e)
            }
        }
    }

    /// Releases the vantage point and drops its session.
    pub fn on_remove(&self, path: &Path) -> Result<()> {
        let (ip, _) = parse_socket_name(path)?;
        let released = self.store.update_controller(ip, None, self.local);
        if self.registry.remove(ip).is_some() {
            info!(vp = %ip, sessions = self.registry.len(), "vantage point disconnected");
        }
        released.map(|_| ())
    }

    /// Releases ownership of every registered vantage point.
    pub fn release_all(&self) {
        debug!("releasing all vantage points");
        for ip in self.registry.ips() {
            if let Err(e) = self.store.update_controller(ip, None, self.local) {
                warn!(vp = %ip, error = %e, "failed to release vantage point");
            }
        }
    }

    /// Handles watcher events until `shutdown` fires or the watcher closes.
    pub async fn run(&self, watcher: &SocketWatcher, shutdown: CancellationToken) {
        info!(dir = %watcher.dir().display(), "started event handling loop");
        loop {
            let event = match watcher.get_event(&shutdown).await {
                Ok(event) => event,
                Err(RevtrError::Cancelled) | Err(RevtrError::WatcherClosed) => break,
                Err(e) => {
                    warn!(error = %e, "watcher error");
                    continue;
                }
            };
            debug!(?event, "socket directory event");
            if let Err(e) = self.handle_event(&event).await {
                warn!(path = %event.path().display(), error = %e, "failed to handle socket event");
            }
        }
        info!("event handling loop stopped");
    }
}
