//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument and
//! defaults to config/dev.toml. A missing or unparseable file falls back
//! to built-in defaults with a warning.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Deployment identifier used as a metrics label (e.g., "reykjavik")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "saferoute".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// TCP port for the presence message transport (newline-delimited JSON)
    #[serde(default = "default_presence_port")]
    pub presence_port: u16,
    /// HTTP port for the route API, health, and metrics (0 to disable)
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_presence_port() -> u16 {
    25710
}

fn default_http_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { presence_port: default_presence_port(), http_port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// OSRM-compatible routing base URL
    #[serde(default = "default_routing_url")]
    pub routing_url: String,
    /// Traffic flow segment API base URL
    #[serde(default = "default_traffic_url")]
    pub traffic_url: String,
    /// Traffic API key; scoring falls back to the neutral traffic score
    /// when unset
    #[serde(default)]
    pub traffic_api_key: Option<String>,
    /// Overpass-compatible feature count API URL
    #[serde(default = "default_overpass_url")]
    pub overpass_url: String,
    /// Per-call timeout for scoring providers (milliseconds)
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Timeout for the routing provider (milliseconds)
    #[serde(default = "default_routing_timeout_ms")]
    pub routing_timeout_ms: u64,
}

fn default_routing_url() -> String {
    "http://router.project-osrm.org".to_string()
}

fn default_traffic_url() -> String {
    "https://api.tomtom.com/traffic/services/4/flowSegmentData/relative/10/json".to_string()
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    2000
}

fn default_routing_timeout_ms() -> u64 {
    10_000
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            routing_url: default_routing_url(),
            traffic_url: default_traffic_url(),
            traffic_api_key: None,
            overpass_url: default_overpass_url(),
            timeout_ms: default_provider_timeout_ms(),
            routing_timeout_ms: default_routing_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Inactivity retention before a session is swept (hours)
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
    /// Interval between inactivity sweeps (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Bound of the inbound event channel shared by all connections
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Bound of each connection's outbound message channel
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_session_ttl_hours() -> u64 {
    12
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    1000
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            event_buffer: default_event_buffer(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoresConfig {
    /// File path for durable emergency alert append (JSONL format)
    #[serde(default = "default_alert_file")]
    pub alert_file: String,
    /// Optional JSON file of user profiles for alert enrichment
    #[serde(default)]
    pub profile_file: Option<String>,
}

fn default_alert_file() -> String {
    "alerts.jsonl".to_string()
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self { alert_file: default_alert_file(), profile_file: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    presence_port: u16,
    http_port: u16,
    routing_url: String,
    traffic_url: String,
    traffic_api_key: Option<String>,
    overpass_url: String,
    provider_timeout_ms: u64,
    routing_timeout_ms: u64,
    session_ttl_hours: u64,
    sweep_interval_secs: u64,
    event_buffer: usize,
    outbound_buffer: usize,
    alert_file: String,
    profile_file: Option<String>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            presence_port: toml_config.server.presence_port,
            http_port: toml_config.server.http_port,
            routing_url: toml_config.providers.routing_url,
            traffic_url: toml_config.providers.traffic_url,
            traffic_api_key: toml_config.providers.traffic_api_key,
            overpass_url: toml_config.providers.overpass_url,
            provider_timeout_ms: toml_config.providers.timeout_ms,
            routing_timeout_ms: toml_config.providers.routing_timeout_ms,
            session_ttl_hours: toml_config.presence.session_ttl_hours,
            sweep_interval_secs: toml_config.presence.sweep_interval_secs,
            event_buffer: toml_config.presence.event_buffer,
            outbound_buffer: toml_config.presence.outbound_buffer,
            alert_file: toml_config.stores.alert_file,
            profile_file: toml_config.stores.profile_file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {e:#}. Using defaults.");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn presence_port(&self) -> u16 {
        self.presence_port
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn routing_url(&self) -> &str {
        &self.routing_url
    }

    pub fn traffic_url(&self) -> &str {
        &self.traffic_url
    }

    pub fn traffic_api_key(&self) -> Option<&str> {
        self.traffic_api_key.as_deref()
    }

    pub fn overpass_url(&self) -> &str {
        &self.overpass_url
    }

    pub fn provider_timeout_ms(&self) -> u64 {
        self.provider_timeout_ms
    }

    pub fn routing_timeout_ms(&self) -> u64 {
        self.routing_timeout_ms
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours as i64)
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    pub fn alert_file(&self) -> &str {
        &self.alert_file
    }

    pub fn profile_file(&self) -> Option<&str> {
        self.profile_file.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "saferoute");
        assert_eq!(config.presence_port(), 25710);
        assert_eq!(config.http_port(), 8080);
        assert_eq!(config.provider_timeout_ms(), 2000);
        assert_eq!(config.session_ttl(), chrono::Duration::hours(12));
        assert_eq!(config.sweep_interval_secs(), 60);
        assert_eq!(config.alert_file(), "alerts.jsonl");
        assert!(config.profile_file().is_none());
        assert!(config.traffic_api_key().is_none());
    }

    #[test]
    fn test_empty_toml_uses_section_defaults() {
        let toml_config: TomlConfig = toml::from_str("").unwrap();
        let config = Config::from_toml(toml_config, "empty");
        assert_eq!(config.event_buffer(), 1000);
        assert_eq!(config.outbound_buffer(), 256);
        assert_eq!(config.metrics_interval_secs(), 10);
    }

    #[test]
    fn test_partial_section_override() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[presence]
session_ttl_hours = 1
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "partial");
        assert_eq!(config.session_ttl(), chrono::Duration::hours(1));
        // Untouched fields keep their defaults
        assert_eq!(config.sweep_interval_secs(), 60);
    }
}
