use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{Rows, VpStore};
use crate::error::{Result, RevtrError};
use crate::model::VantagePoint;

/// Store persisted as a JSON array, rewritten atomically after every change.
pub struct FileVpStore {
    path: PathBuf,
    rows: Mutex<Rows>,
}

impl FileVpStore {
    /// Loads `path`, starting empty when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let rows = match fs::read(path) {
            Ok(bytes) => {
                let vps: Vec<VantagePoint> = serde_json::from_slice(&bytes).map_err(|e| {
                    RevtrError::Store(format!("Failed to parse {}: {e}", path.display()))
                })?;
                vps.into_iter().map(|vp| (u32::from(vp.ip), vp)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Rows::new(),
            Err(e) => {
                return Err(RevtrError::Store(format!("Failed to read {}: {e}", path.display())))
            }
        };
        debug!(path = %path.display(), vps = rows.len(), "opened vantage point store");
        Ok(Self { path: path.to_path_buf(), rows: Mutex::new(rows) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Rows>> {
        self.rows.lock().map_err(|_| RevtrError::Store("store lock poisoned".to_string()))
    }

    /// Writes a temporary sibling and renames it over the store file.
    fn persist(&self, rows: &Rows) -> Result<()> {
        let vps: Vec<&VantagePoint> = rows.values().collect();
        let bytes = serde_json::to_vec_pretty(&vps)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| RevtrError::Store(format!("Failed to write {}: {e}", self.path.display())))
    }
}

impl VpStore for FileVpStore {
    fn update_controller(
        &self,
        ip: Ipv4Addr,
        owner: Option<Ipv4Addr>,
        observer: Ipv4Addr,
    ) -> Result<bool> {
        let mut rows = self.lock()?;
        let changed = super::update_controller(&mut rows, ip, owner, observer);
        if changed {
            self.persist(&rows)?;
        }
        Ok(changed)
    }

    fn get_vps(&self) -> Result<Vec<VantagePoint>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn get_active_vps(&self) -> Result<Vec<VantagePoint>> {
        Ok(super::active(&*self.lock()?))
    }

    fn update_check_status(&self, ip: Ipv4Addr, status: &str) -> Result<()> {
        let mut rows = self.lock()?;
        if super::update_check_status(&mut rows, ip, status) {
            self.persist(&rows)?;
        }
        Ok(())
    }

    fn upsert_vp(&self, vp: VantagePoint) -> Result<()> {
        let mut rows = self.lock()?;
        super::upsert(&mut rows, vp);
        self.persist(&rows)
    }

    fn close(&self) -> Result<()> {
        let rows = self.lock()?;
        self.persist(&rows)
    }
}
