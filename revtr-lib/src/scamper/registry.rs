use ahash::AHashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::command::Request;
use super::socket::{ResultReceiver, Session};
use crate::error::{Result, RevtrError};

/// Sessions keyed by vantage point address. At most one per address.
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<AHashMap<Ipv4Addr, Session>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<Ipv4Addr, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("session registry lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Registers `session`, stopping any session it displaces.
    pub fn add(&self, session: Session) {
        let ip = session.ip();
        let displaced = self.lock().insert(ip, session);
        if let Some(old) = displaced {
            debug!(vp = %ip, "replacing session");
            old.stop();
        }
    }

    /// Removes and stops the session for `ip`, if any.
    pub fn remove(&self, ip: Ipv4Addr) -> Option<Session> {
        let removed = self.lock().remove(&ip);
        if let Some(s) = &removed {
            s.stop();
        }
        removed
    }

    pub fn get(&self, ip: Ipv4Addr) -> Result<Session> {
        self.lock().get(&ip).cloned().ok_or(RevtrError::SocketNotFound(ip))
    }

    /// Snapshot of the registered sessions, delivered over a channel.
    pub fn get_all(&self) -> mpsc::UnboundedReceiver<Session> {
        let (tx, rx) = mpsc::unbounded_channel();
        for session in self.lock().values() {
            // receiver is still in scope
            let _ = tx.send(session.clone());
        }
        rx
    }

    /// Addresses of every registered session.
    pub fn ips(&self) -> Vec<Ipv4Addr> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub async fn do_measurement(&self, ip: Ipv4Addr, req: &Request) -> Result<(ResultReceiver, u32)> {
        let session = self.get(ip)?;
        session.do_measurement(req).await
    }

    pub fn remove_measurement(&self, ip: Ipv4Addr, id: u32) -> Result<()> {
        self.get(ip)?.remove_measurement(id);
        Ok(())
    }

    /// Stops every session and empties the registry.
    pub fn stop_all(&self) {
        let drained: Vec<Session> = self.lock().drain().map(|(_, s)| s).collect();
        for s in drained {
            s.stop();
        }
    }
}
