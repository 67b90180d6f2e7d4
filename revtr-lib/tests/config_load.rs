mod helpers;

use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use helpers::{create_tls_fixture, tmp_path, TestResult};
use revtr_lib::config::{
    load_plc_config, load_vp_config, read_plc_config, validate_plc_config, PlcOverrides,
    VpOverrides,
};
use revtr_lib::RevtrError;

#[test]
fn loads_yaml_controller_config() -> TestResult {
    let tls = create_tls_fixture()?;
    let path = tmp_path("plcontroller.yaml");
    let yaml = format!(
        r#"
listen: "127.0.0.1:4380"
local_addr: "192.168.1.1"
timeout_secs: 30
socket_dir: "/tmp/revtr-sockets"
scamper:
  port: 4381
  start: false
health:
  interval_secs: 600
  ssh_user: "uw_revtr"
spoof:
  flush_interval_ms: 500
store:
  path: "/var/lib/revtr/vps.json"
tls:
  cert_path: "{}"
  key_path: "{}"
  ca_path: "{}"
telemetry:
  metrics_port: 9100
"#,
        tls.server_cert.display(),
        tls.server_key.display(),
        tls.ca.display()
    );
    fs::write(&path, yaml)?;

    let cfg = load_plc_config(&path)?;
    fs::remove_file(&path)?;
    assert_eq!(cfg.listen.to_string(), "127.0.0.1:4380");
    assert_eq!(cfg.local_addr, Ipv4Addr::new(192, 168, 1, 1));
    assert_eq!(cfg.timeout_secs, 30);
    assert_eq!(cfg.scamper.port, 4381);
    assert!(!cfg.scamper.start);
    assert_eq!(cfg.health.interval_secs, 600);
    assert_eq!(cfg.health.ssh_user, "uw_revtr");
    assert!(cfg.health.enabled, "enabled by default");
    assert_eq!(cfg.spoof.flush_interval_ms, 500);
    assert_eq!(cfg.spoof.registration_ttl_secs, 60);
    assert_eq!(cfg.store.path, Some(PathBuf::from("/var/lib/revtr/vps.json")));
    assert_eq!(cfg.telemetry.metrics_port, Some(9100));
    assert_eq!(cfg.tls.server_name, "plcontroller");
    Ok(())
}

#[test]
fn loads_toml_agent_config() -> TestResult {
    let tls = create_tls_fixture()?;
    let path = tmp_path("plvp.toml");
    let toml = format!(
        r#"
local_addr = "10.0.0.1"

[plcontroller]
host = "plcontroller.example.org"
rpc_port = 4380

[monitor]
flush_interval_ms = 250

[tls]
cert_path = "{}"
key_path = "{}"
ca_path = "{}"
"#,
        tls.client_cert.display(),
        tls.client_key.display(),
        tls.ca.display()
    );
    fs::write(&path, toml)?;

    let cfg = load_vp_config(&path)?;
    fs::remove_file(&path)?;
    assert_eq!(cfg.local_addr, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(cfg.plcontroller.host, "plcontroller.example.org");
    assert_eq!(cfg.plcontroller.rpc_port, 4380);
    assert_eq!(cfg.monitor.flush_interval_ms, 250);
    Ok(())
}

#[test]
fn missing_tls_material_is_rejected() -> TestResult {
    let path = tmp_path("no-tls.yaml");
    fs::write(&path, "local_addr: \"192.168.1.1\"\n")?;
    let res = load_plc_config(&path);
    fs::remove_file(&path)?;
    assert!(matches!(res, Err(RevtrError::Config(msg)) if msg.contains("Certificate")));
    Ok(())
}

#[test]
fn zero_timeout_is_rejected() -> TestResult {
    let tls = create_tls_fixture()?;
    let path = tmp_path("zero.yaml");
    fs::write(&path, "timeout_secs: 0\n")?;
    let mut cfg = read_plc_config(&path)?;
    fs::remove_file(&path)?;

    PlcOverrides {
        cert_file: Some(tls.server_cert.display().to_string()),
        key_file: Some(tls.server_key.display().to_string()),
        root_ca: Some(tls.ca.display().to_string()),
        ..PlcOverrides::default()
    }
    .apply(&mut cfg);
    assert!(matches!(validate_plc_config(&cfg), Err(RevtrError::Config(msg)) if msg.contains("timeout")));

    PlcOverrides { timeout_secs: Some(10), ..PlcOverrides::default() }.apply(&mut cfg);
    validate_plc_config(&cfg)?;
    Ok(())
}

#[test]
fn overrides_replace_only_given_values() -> TestResult {
    let path = tmp_path("overrides.yaml");
    fs::write(&path, "socket_dir: \"/srv/sockets\"\nscamper:\n  port: 5000\n")?;
    let mut cfg = read_plc_config(&path)?;
    fs::remove_file(&path)?;

    PlcOverrides {
        scamper_port: Some(6000),
        store_path: Some(PathBuf::from("/tmp/vps.json")),
        log_level: Some("debug".to_string()),
        ..PlcOverrides::default()
    }
    .apply(&mut cfg);
    assert_eq!(cfg.socket_dir, PathBuf::from("/srv/sockets"));
    assert_eq!(cfg.scamper.port, 6000);
    assert_eq!(cfg.store.path, Some(PathBuf::from("/tmp/vps.json")));
    assert_eq!(cfg.logging.level, "debug");

    let mut vp = revtr_lib::VpConfig::default();
    VpOverrides { host: Some("plc.example.org".to_string()), ..VpOverrides::default() }.apply(&mut vp);
    assert_eq!(vp.plcontroller.host, "plc.example.org");
    Ok(())
}

#[test]
fn unreadable_config_is_an_error() {
    let res = load_plc_config(tmp_path("does-not-exist.yaml"));
    assert!(matches!(res, Err(RevtrError::Config(msg)) if msg.contains("Failed to read")));
}
