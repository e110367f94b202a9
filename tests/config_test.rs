//! Integration tests for configuration loading

use saferoute_gateway::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-site"

[server]
presence_port = 26000
http_port = 9090

[providers]
routing_url = "http://osrm.test"
traffic_api_key = "test-key"
timeout_ms = 1500
routing_timeout_ms = 5000

[presence]
session_ttl_hours = 6
sweep_interval_secs = 30
event_buffer = 512
outbound_buffer = 64

[stores]
alert_file = "/tmp/test-alerts.jsonl"
profile_file = "/tmp/test-profiles.json"

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.presence_port(), 26000);
    assert_eq!(config.http_port(), 9090);
    assert_eq!(config.routing_url(), "http://osrm.test");
    assert_eq!(config.traffic_api_key(), Some("test-key"));
    assert_eq!(config.provider_timeout_ms(), 1500);
    assert_eq!(config.routing_timeout_ms(), 5000);
    assert_eq!(config.session_ttl(), chrono::Duration::hours(6));
    assert_eq!(config.sweep_interval_secs(), 30);
    assert_eq!(config.event_buffer(), 512);
    assert_eq!(config.outbound_buffer(), 64);
    assert_eq!(config.alert_file(), "/tmp/test-alerts.jsonl");
    assert_eq!(config.profile_file(), Some("/tmp/test-profiles.json"));
    assert_eq!(config.metrics_interval_secs(), 15);
}

#[test]
fn test_partial_config_keeps_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[server]\npresence_port = 26100\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.presence_port(), 26100);
    // Everything else falls back to defaults
    assert_eq!(config.http_port(), 8080);
    assert_eq!(config.session_ttl(), chrono::Duration::hours(12));
    assert_eq!(config.alert_file(), "alerts.jsonl");
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.site_id(), "saferoute");
    assert_eq!(config.presence_port(), 25710);
    assert!(config.traffic_api_key().is_none());
}
