//! Vantage point records and the ownership contract between controllers.

mod file;
mod memory;

pub use file::FileVpStore;
pub use memory::MemoryVpStore;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::model::{unix_now, VantagePoint};

/// Storage for vantage point records.
///
/// Implementations hold one lock across the ownership check and the write
/// in [`VpStore::update_controller`].
pub trait VpStore: Send + Sync {
    /// Sets the owner of `ip` to `owner`, but only when the vantage point is
    /// unbound or currently owned by `observer`. Returns whether `observer`
    /// was allowed to write; rewriting the current owner leaves the record
    /// untouched.
    fn update_controller(
        &self,
        ip: Ipv4Addr,
        owner: Option<Ipv4Addr>,
        observer: Ipv4Addr,
    ) -> Result<bool>;

    fn get_vps(&self) -> Result<Vec<VantagePoint>>;

    /// Vantage points currently bound to a controller.
    fn get_active_vps(&self) -> Result<Vec<VantagePoint>>;

    fn update_check_status(&self, ip: Ipv4Addr, status: &str) -> Result<()>;

    /// Inserts or replaces the descriptive fields of a record, preserving
    /// its current owner.
    fn upsert_vp(&self, vp: VantagePoint) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Opens the store named by the configuration.
pub fn open(cfg: &StoreConfig) -> Result<Arc<dyn VpStore>> {
    Ok(match &cfg.path {
        Some(path) => Arc::new(FileVpStore::open(path)?),
        None => Arc::new(MemoryVpStore::new()),
    })
}

type Rows = BTreeMap<u32, VantagePoint>;

fn key(ip: Ipv4Addr) -> u32 {
    u32::from(ip)
}

fn update_controller(
    rows: &mut Rows,
    ip: Ipv4Addr,
    owner: Option<Ipv4Addr>,
    observer: Ipv4Addr,
) -> bool {
    if !rows.contains_key(&key(ip)) {
        // releasing an unknown vantage point
        if owner.is_none() {
            return false;
        }
        rows.insert(key(ip), VantagePoint::new(ip));
    }
    let Some(row) = rows.get_mut(&key(ip)) else {
        return false;
    };
    match row.controller {
        Some(current) if current != observer => false,
        _ if row.controller == owner && row.active == owner.is_some() => true,
        _ => {
            row.controller = owner;
            row.active = owner.is_some();
            row.last_updated = unix_now();
            true
        }
    }
}

fn update_check_status(rows: &mut Rows, ip: Ipv4Addr, status: &str) -> bool {
    match rows.get_mut(&key(ip)) {
        Some(row) => {
            row.check_status = status.to_string();
            row.last_updated = unix_now();
            true
        }
        None => false,
    }
}

fn upsert(rows: &mut Rows, mut vp: VantagePoint) {
    if let Some(existing) = rows.get(&key(vp.ip)) {
        vp.controller = existing.controller;
        vp.active = existing.active;
    }
    rows.insert(key(vp.ip), vp);
}

fn active(rows: &Rows) -> Vec<VantagePoint> {
    rows.values().filter(|vp| vp.controller.is_some()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
    const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[test]
    fn foreign_owner_is_kept() {
        let mut rows = Rows::new();
        assert!(update_controller(&mut rows, VP, Some(A), A));
        assert!(!update_controller(&mut rows, VP, Some(B), B));
        assert!(!update_controller(&mut rows, VP, None, B));
        assert_eq!(rows.get(&key(VP)).and_then(|r| r.controller), Some(A));
    }

    #[test]
    fn release_then_claim() {
        let mut rows = Rows::new();
        update_controller(&mut rows, VP, Some(A), A);
        assert!(update_controller(&mut rows, VP, None, A));
        assert!(update_controller(&mut rows, VP, Some(B), B));
        assert_eq!(active(&rows).len(), 1);
    }

    #[test]
    fn release_unknown_is_noop() {
        let mut rows = Rows::new();
        assert!(!update_controller(&mut rows, VP, None, A));
        assert!(rows.is_empty());
    }

    #[test]
    fn repeated_claim_keeps_timestamp() {
        let mut rows = Rows::new();
        assert!(update_controller(&mut rows, VP, Some(A), A));
        if let Some(row) = rows.get_mut(&key(VP)) {
            row.last_updated = 7;
        }
        assert!(update_controller(&mut rows, VP, Some(A), A));
        assert_eq!(rows.get(&key(VP)).map(|r| r.last_updated), Some(7));
    }

    #[test]
    fn upsert_keeps_owner() {
        let mut rows = Rows::new();
        update_controller(&mut rows, VP, Some(A), A);
        let mut vp = VantagePoint::new(VP);
        vp.site = "lab".to_string();
        upsert(&mut rows, vp);
        let row = rows.get(&key(VP));
        assert_eq!(row.and_then(|r| r.controller), Some(A));
        assert_eq!(row.map(|r| r.site.as_str()), Some("lab"));
    }
}
