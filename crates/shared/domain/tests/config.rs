use gts_domain::config::{GcConfig, ManagerConfig, RegistryConfig, ServerConfig};
use serde_json::json;

#[test]
fn config_defaults_are_sane() {
    let server = ServerConfig::default();
    assert_eq!(server.port, 9876);
    assert_eq!(server.max_frame_bytes, 4 * 1024 * 1024);

    let registry = RegistryConfig::default();
    assert_eq!(registry.channel_expired_secs, 120);
    assert_eq!(registry.scan_interval_secs, 10);

    let gc = GcConfig::default();
    assert!(gc.enabled);
    assert_eq!(gc.interval_secs, 60);

    let cfg = ManagerConfig::default();
    assert_eq!(cfg.log.level, "info");
    assert_eq!(cfg.coordinator_domain(), "0.0.0.0:9876");
}

#[test]
fn manager_config_deserializes_partial_input() {
    let raw = json!({
        "server": { "address": "127.0.0.1", "port": 7000 },
        "coordinator": { "domain": "tm-east" },
        "gc": { "enabled": false }
    });

    let cfg: ManagerConfig = serde_json::from_value(raw).expect("config deserialize");
    assert_eq!(cfg.server.port, 7000);
    assert_eq!(cfg.server.max_frame_bytes, 4 * 1024 * 1024);
    assert!(!cfg.gc.enabled);
    assert_eq!(cfg.gc.interval_secs, 60);
    assert_eq!(cfg.coordinator_domain(), "tm-east");
}

#[test]
fn blank_domain_falls_back_to_listener_address() {
    let mut cfg = ManagerConfig::default();
    cfg.server.port = 7001;
    cfg.coordinator.domain = Some("  ".to_owned());
    assert_eq!(cfg.coordinator_domain(), "0.0.0.0:7001");
}
