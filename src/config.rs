use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub profiles: ProfileDefaultsConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoordinatorConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,
    #[serde(default = "default_popup_idle_timeout_ms")]
    pub popup_idle_timeout_ms: u64,
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
    #[serde(default = "default_broadcast_concurrency")]
    pub broadcast_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeartbeatConfig {
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Values a fresh draft profile starts from.
#[derive(Debug, Deserialize, Clone)]
pub struct ProfileDefaultsConfig {
    #[serde(default = "default_colour")]
    pub default_colour: String,
    #[serde(default = "default_websites")]
    pub default_websites: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// JSON file holding the persisted keys.
    #[serde(default = "default_state_path")]
    pub path: String,
}

// Defaults
fn default_request_timeout_ms() -> u64 {
    2000
}
fn default_agent_timeout_ms() -> u64 {
    500
}
fn default_popup_idle_timeout_ms() -> u64 {
    5000
}
fn default_reap_interval_ms() -> u64 {
    1000
}
fn default_broadcast_concurrency() -> usize {
    8
}
fn default_ping_interval_ms() -> u64 {
    1000
}
fn default_stats_interval_ms() -> u64 {
    2000
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_state_path() -> String {
    "filter-sync-state.json".to_string()
}
pub(crate) fn default_colour() -> String {
    "#ff9823".to_string()
}
pub(crate) fn default_websites() -> Vec<String> {
    ["youtube.com", "twitter.com", "x.com", "linkedin.com", "reddit.com"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            agent_timeout_ms: default_agent_timeout_ms(),
            popup_idle_timeout_ms: default_popup_idle_timeout_ms(),
            reap_interval_ms: default_reap_interval_ms(),
            broadcast_concurrency: default_broadcast_concurrency(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ProfileDefaultsConfig {
    fn default() -> Self {
        Self {
            default_colour: default_colour(),
            default_websites: default_websites(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl CoordinatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub fn popup_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.popup_idle_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

impl HeartbeatConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.coordinator.agent_timeout_ms, 500);
        assert_eq!(config.heartbeat.ping_interval_ms, 1000);
        assert_eq!(config.heartbeat.stats_interval_ms, 2000);
        assert_eq!(config.profiles.default_colour, "#ff9823");
        assert_eq!(config.profiles.default_websites.len(), 5);
        assert_eq!(config.storage.path, "filter-sync-state.json");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [coordinator]
            agent_timeout_ms = 50

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.coordinator.agent_timeout(), Duration::from_millis(50));
        assert_eq!(config.coordinator.request_timeout_ms, 2000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [heartbeat]
            ping_interval_ms = 250

            [storage]
            path = "/var/lib/filter-sync/state.json"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.heartbeat.ping_interval(), Duration::from_millis(250));
        assert_eq!(config.storage.path, "/var/lib/filter-sync/state.json");
        assert!(Config::load(dir.path().join("missing.toml")).await.is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_toml("coordinator = 3").is_err());
    }
}
