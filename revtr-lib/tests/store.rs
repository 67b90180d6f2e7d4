mod helpers;

use helpers::{tmp_path, TestResult};
use revtr_lib::config::StoreConfig;
use revtr_lib::model::VantagePoint;
use revtr_lib::store::{self, FileVpStore, MemoryVpStore, VpStore};
use std::net::Ipv4Addr;

const VP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const PLC_A: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const PLC_B: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

fn described(ip: Ipv4Addr) -> VantagePoint {
    VantagePoint {
        hostname: "planetlab1.example.org".to_string(),
        site: "example".to_string(),
        can_spoof: true,
        ..VantagePoint::new(ip)
    }
}

#[test]
fn test_claim_is_exclusive_between_controllers() -> TestResult {
    let store = MemoryVpStore::with_vps([described(VP)]);

    assert!(store.update_controller(VP, Some(PLC_A), PLC_A)?);
    assert!(!store.update_controller(VP, Some(PLC_B), PLC_B)?, "owned by another controller");
    assert!(!store.update_controller(VP, None, PLC_B)?, "only the owner may release");

    let active = store.get_active_vps()?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].controller, Some(PLC_A));
    assert!(active[0].active);

    assert!(store.update_controller(VP, None, PLC_A)?);
    assert!(store.get_active_vps()?.is_empty());
    assert!(store.update_controller(VP, Some(PLC_B), PLC_B)?);
    Ok(())
}

#[test]
fn test_reclaiming_own_vp_keeps_timestamp() -> TestResult {
    let owned = VantagePoint { controller: Some(PLC_A), active: true, last_updated: 42, ..described(VP) };
    let store = MemoryVpStore::with_vps([owned]);

    assert!(store.update_controller(VP, Some(PLC_A), PLC_A)?);
    assert!(store.update_controller(VP, Some(PLC_A), PLC_A)?);
    assert_eq!(store.get_vps()?[0].last_updated, 42);

    assert!(store.update_controller(VP, None, PLC_A)?);
    assert_ne!(store.get_vps()?[0].last_updated, 42, "release is a real change");
    Ok(())
}

#[test]
fn test_claiming_unknown_vp_creates_row() -> TestResult {
    let store = MemoryVpStore::new();
    assert!(store.update_controller(VP, Some(PLC_A), PLC_A)?);
    let vps = store.get_vps()?;
    assert_eq!(vps.len(), 1);
    assert_eq!(vps[0].hostname, VP.to_string());
    Ok(())
}

#[test]
fn test_check_status_recorded() -> TestResult {
    let store = MemoryVpStore::with_vps([described(VP)]);
    store.update_check_status(VP, "Healthy")?;
    assert_eq!(store.get_vps()?[0].check_status, "Healthy");
    Ok(())
}

#[test]
fn test_file_store_survives_reopen() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vps.json");

    let store = FileVpStore::open(&path)?;
    assert!(store.get_vps()?.is_empty(), "missing file opens empty");
    store.upsert_vp(described(VP))?;
    store.update_controller(VP, Some(PLC_A), PLC_A)?;
    store.update_check_status(VP, "Healthy")?;
    store.close()?;
    assert!(!path.with_extension("tmp").exists());

    let reopened = FileVpStore::open(&path)?;
    let vps = reopened.get_vps()?;
    assert_eq!(vps.len(), 1);
    assert_eq!(vps[0].controller, Some(PLC_A));
    assert_eq!(vps[0].check_status, "Healthy");
    assert!(vps[0].can_spoof);

    // descriptive updates keep the owner
    reopened.upsert_vp(VantagePoint { site: "moved".to_string(), ..described(VP) })?;
    let vps = reopened.get_active_vps()?;
    assert_eq!(vps[0].site, "moved");
    assert_eq!(vps[0].controller, Some(PLC_A));
    Ok(())
}

#[test]
fn test_corrupt_store_file_is_an_error() -> TestResult {
    let path = tmp_path("vps.json");
    std::fs::write(&path, b"{not json")?;
    let res = FileVpStore::open(&path);
    std::fs::remove_file(&path)?;
    assert!(matches!(res, Err(revtr_lib::RevtrError::Store(_))));
    Ok(())
}

#[test]
fn test_open_selects_backend() -> TestResult {
    let memory = store::open(&StoreConfig { path: None })?;
    assert!(memory.get_vps()?.is_empty());

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vps.json");
    let file = store::open(&StoreConfig { path: Some(path.clone()) })?;
    file.update_controller(VP, Some(PLC_A), PLC_A)?;
    assert!(path.exists());
    Ok(())
}
