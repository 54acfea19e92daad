//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be serialized, written to disk,
//! and loaded back with identical field values.

use gatelink_core::config::{ClientConfig, ConfigBuilder};
use gatelink_core::ConfigError;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");

    let config = ClientConfig::default();
    config.save(&path).unwrap();

    let loaded = ClientConfig::load(&path).unwrap();
    assert_eq!(loaded.gateway, config.gateway);
    assert_eq!(loaded.requests.timeout_ms, config.requests.timeout_ms);
    assert_eq!(loaded.reconnect.base_delay_ms, config.reconnect.base_delay_ms);
    assert_eq!(loaded.reconnect.max_delay_ms, config.reconnect.max_delay_ms);
    assert_eq!(loaded.events.session_key, config.events.session_key);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");

    let config = ConfigBuilder::new()
        .url("wss://gateway.example.com/ws")
        .token("sk-roundtrip")
        .http_url("https://gateway.example.com/rpc")
        .timeout_ms(5_000)
        .backoff_ms(500, 10_000)
        .session_key("work")
        .build();
    config.save(&path).unwrap();

    let loaded = ClientConfig::load(&path).unwrap();
    assert_eq!(loaded.gateway.url, "wss://gateway.example.com/ws");
    assert_eq!(
        loaded.gateway.token.as_ref().map(|t| t.expose_secret()),
        Some("sk-roundtrip")
    );
    assert_eq!(
        loaded.gateway.http_url.as_deref(),
        Some("https://gateway.example.com/rpc")
    );
    assert_eq!(loaded.requests.timeout_ms, 5_000);
    assert_eq!(loaded.reconnect.base_delay_ms, 500);
    assert_eq!(loaded.reconnect.max_delay_ms, 10_000);
    assert_eq!(loaded.events.session_key, "work");
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_hand_written_json5() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");
    std::fs::write(
        &path,
        r#"{
            // comments and trailing commas are fine
            gateway: { url: 'ws://10.0.0.2:18789/ws', },
            requests: { timeout_ms: 1000 },
        }"#,
    )
    .unwrap();

    let loaded = ClientConfig::load(&path).unwrap();
    assert_eq!(loaded.gateway.url, "ws://10.0.0.2:18789/ws");
    assert_eq!(loaded.requests.timeout_ms, 1000);
    assert_eq!(loaded.reconnect.max_delay_ms, 30_000);
}

#[test]
fn test_config_load_nonexistent() {
    let result = ClientConfig::load(Path::new("/nonexistent/gatelink.json5"));
    let err = result.unwrap_err();
    assert!(err.is_missing());
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn test_config_parse_invalid() {
    let result = ClientConfig::parse("not valid json");
    assert!(result.is_err());
}

#[test]
fn test_resolve_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = ClientConfig::resolve(Some(&dir.path().join("absent.json5"))).unwrap();
    assert_eq!(config.requests.timeout_ms, 30_000);
    assert_eq!(config.reconnect.base_delay_ms, 1_000);
}
