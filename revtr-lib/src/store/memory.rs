use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

use super::{Rows, VpStore};
use crate::error::{Result, RevtrError};
use crate::model::VantagePoint;

/// Store that lives as long as the process.
#[derive(Default)]
pub struct MemoryVpStore {
    rows: Mutex<Rows>,
}

impl MemoryVpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vps(vps: impl IntoIterator<Item = VantagePoint>) -> Self {
        let store = Self::new();
        if let Ok(mut rows) = store.rows.lock() {
            for vp in vps {
                rows.insert(u32::from(vp.ip), vp);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Rows>> {
        self.rows.lock().map_err(|_| RevtrError::Store("store lock poisoned".to_string()))
    }
}

impl VpStore for MemoryVpStore {
    fn update_controller(
        &self,
        ip: Ipv4Addr,
        owner: Option<Ipv4Addr>,
        observer: Ipv4Addr,
    ) -> Result<bool> {
        Ok(super::update_controller(&mut *self.lock()?, ip, owner, observer))
    }

    fn get_vps(&self) -> Result<Vec<VantagePoint>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn get_active_vps(&self) -> Result<Vec<VantagePoint>> {
        Ok(super::active(&*self.lock()?))
    }

    fn update_check_status(&self, ip: Ipv4Addr, status: &str) -> Result<()> {
        super::update_check_status(&mut *self.lock()?, ip, status);
        Ok(())
    }

    fn upsert_vp(&self, vp: VantagePoint) -> Result<()> {
        super::upsert(&mut *self.lock()?, vp);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
