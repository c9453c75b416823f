//! Pointscope configuration (`pointscope.toml`)

use pointscope_capture::{CaptureSettings, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete CLI configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream endpoints
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Backoff per upstream
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Snapshot store backend
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Row table override
    #[serde(default)]
    pub rows: RowsConfig,
}

impl AppConfig {
    /// Parse `path`, or fall back to defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        let defaults = CaptureSettings::default();
        CaptureSettings {
            tvl_retry: self.retry.tvl.policy_over(&defaults.tvl_retry),
            points_retry: self.retry.points.policy_over(&defaults.points_retry),
            points_ttl: Duration::from_secs(self.cache.points_ttl_secs),
            tvl_ttl: Duration::from_secs(self.cache.tvl_ttl_secs),
            warmup: self.sources.warmup_url.is_some(),
        }
    }
}

/// Upstream source settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_tvl_url")]
    pub tvl_url: String,

    #[serde(default = "default_points_url")]
    pub points_url: String,

    /// Named points program to report
    #[serde(default = "default_points_program")]
    pub points_program: String,

    /// Pinged before the points fetch when set
    #[serde(default)]
    pub warmup_url: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_tvl_url() -> String {
    "http://127.0.0.1:8787/api/tvl".to_string()
}

fn default_points_url() -> String {
    "http://127.0.0.1:8787/api/points".to_string()
}

fn default_points_program() -> String {
    "season-1".to_string()
}

fn default_timeout_secs() -> u64 {
    // Points come from a headless browser
    60
}

fn default_user_agent() -> String {
    format!("pointscope/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            tvl_url: default_tvl_url(),
            points_url: default_points_url(),
            points_program: default_points_program(),
            warmup_url: None,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Backoff overrides for one upstream; unset fields keep that upstream's default
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,

    /// Total attempts including the first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl RetrySection {
    /// `defaults` with this section's fields applied on top
    pub fn policy_over(&self, defaults: &RetryPolicy) -> RetryPolicy {
        RetryPolicy::new(
            self.base_delay_ms
                .map_or(defaults.base_delay, Duration::from_millis),
            self.max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
            self.max_attempts.unwrap_or(defaults.max_attempts),
        )
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub tvl: RetrySection,

    #[serde(default)]
    pub points: RetrySection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_points_ttl")]
    pub points_ttl_secs: u64,

    #[serde(default = "default_tvl_ttl")]
    pub tvl_ttl_secs: u64,
}

fn default_points_ttl() -> u64 {
    300
}

fn default_tvl_ttl() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            points_ttl_secs: default_points_ttl(),
            tvl_ttl_secs: default_tvl_ttl(),
        }
    }
}

/// Store backend kind
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Jsonl,
    Rest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// JSON-lines file for the `jsonl` backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Project base URL for the `rest` backend
    #[serde(default)]
    pub rest_url: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,

    /// Public read key for the `rest` backend
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the shared write secret
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("~/.pointscope/snapshots.jsonl")
}

fn default_table() -> String {
    "tvl_snapshots".to_string()
}

fn default_secret_env() -> String {
    "POINTSCOPE_WRITE_SECRET".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            rest_url: None,
            table: default_table(),
            api_key: None,
            secret_env: default_secret_env(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RowsConfig {
    /// TOML row table replacing the built-in one
    #[serde(default)]
    pub table_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Jsonl);
        assert_eq!(config.cache.points_ttl_secs, 300);

        let settings = config.capture_settings();
        assert!(!settings.warmup);
        assert_eq!(settings.tvl_retry, CaptureSettings::default().tvl_retry);
        assert_eq!(settings.tvl_retry.max_attempts, 4);
    }

    #[test]
    fn test_partial_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [sources]
            points_program = "season-2"
            warmup_url = "https://points.example/warm"

            [retry.points]
            base_delay_ms = 100
            max_delay_ms = 400
            max_attempts = 5

            [store]
            backend = "rest"
            rest_url = "https://db.example.co"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.points_program, "season-2");
        assert_eq!(config.sources.timeout_secs, 60);
        assert_eq!(config.retry.points.max_attempts, Some(5));
        assert_eq!(config.retry.tvl, RetrySection::default());
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.store.table, "tvl_snapshots");
        assert_eq!(config.logging.format, LogFormat::Json);

        let settings = config.capture_settings();
        assert!(settings.warmup);
        assert_eq!(settings.points_retry.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_single_retry_field_keeps_upstream_defaults() {
        let config: AppConfig = toml::from_str("[retry.points]\nmax_attempts = 5").unwrap();
        let settings = config.capture_settings();

        assert_eq!(settings.points_retry.max_attempts, 5);
        assert_eq!(settings.points_retry.base_delay, Duration::from_secs(5));
        assert_eq!(settings.points_retry.max_delay, Duration::from_secs(60));
        assert_eq!(settings.tvl_retry.base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sample_files_parse() {
        let config: AppConfig =
            toml::from_str(include_str!("../../../demos/pointscope.toml")).unwrap();
        assert_eq!(config.sources.points_program, "season-1");
        assert_eq!(config.capture_settings().points_retry.max_attempts, 3);

        let table =
            pointscope_core::RowTable::from_toml_str(include_str!("../../../demos/rows.toml"))
                .unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(toml::from_str::<AppConfig>("[store]\nbackend = \"sqlite\"").is_err());
    }
}
