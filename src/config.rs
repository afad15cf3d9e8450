use crate::dialect;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Explicit dialect; inferred from the URL scheme when unset
    #[serde(default)]
    pub dialect: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Events older than this many days are purged. Required.
    #[serde(default)]
    pub events_days: Option<u32>,
    #[serde(default = "default_purge_timeout_secs")]
    pub purge_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintenanceConfig {
    /// Hour of day (0-23) for the daily pipeline run
    #[serde(default = "default_run_hour")]
    pub run_hour: u32,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_vacuum_hour")]
    pub vacuum_hour: u32,
    #[serde(default = "default_analyze_every_hours")]
    pub analyze_every_hours: u32,
    #[serde(default)]
    pub reindex_nightly: bool,
    #[serde(default = "default_lock_lease_secs")]
    pub lock_lease_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Reports buffered before a forced flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

fn default_database_url() -> String {
    "sqlite:./data/events.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_secs() -> u64 {
    30
}

fn default_purge_timeout_secs() -> u64 {
    // purges may touch millions of rows
    6 * 3600
}

fn default_run_hour() -> u32 {
    3
}

fn default_check_interval_secs() -> u64 {
    3600
}

fn default_vacuum_hour() -> u32 {
    0
}

fn default_analyze_every_hours() -> u32 {
    1
}

fn default_lock_lease_secs() -> u64 {
    12 * 3600
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_listen() -> String {
    "127.0.0.1:9184".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            dialect: None,
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    /// Default settings pointing at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            events_days: None,
            purge_timeout_secs: default_purge_timeout_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn purge_timeout(&self) -> Duration {
        Duration::from_secs(self.purge_timeout_secs)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            run_hour: default_run_hour(),
            check_interval_secs: default_check_interval_secs(),
            vacuum_hour: default_vacuum_hour(),
            analyze_every_hours: default_analyze_every_hours(),
            reindex_nightly: false,
            lock_lease_secs: default_lock_lease_secs(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl IngestConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
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

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid metrics.listen '{}': {}", self.listen, e))
    }
}

/// Load configuration from `path` layered with `EVENT_ENGINE__*` environment variables.
///
/// A missing file is tolerated; the environment alone may carry the settings.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("EVENT_ENGINE").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

/// Logging section only, without validation.
///
/// Used to set up tracing before the full configuration is loaded; any
/// problem falls back to the defaults.
pub fn load_logging_config(path: &Path) -> LoggingConfig {
    config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("EVENT_ENGINE").separator("__"))
        .build()
        .and_then(|c| c.get::<LoggingConfig>("logging"))
        .unwrap_or_default()
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    // Unknown dialects are fatal at startup, never at request time
    dialect::resolve(cfg.database.dialect.as_deref(), &cfg.database.url)?;

    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be at least 1");
    }

    match cfg.retention.events_days {
        None => anyhow::bail!("retention.events_days must be configured"),
        Some(0) => anyhow::bail!("retention.events_days must be greater than 0"),
        Some(_) => {}
    }

    if cfg.retention.purge_timeout_secs == 0 {
        anyhow::bail!("retention.purge_timeout_secs must be greater than 0");
    }

    if cfg.maintenance.run_hour > 23 {
        anyhow::bail!(
            "maintenance.run_hour must be between 0 and 23, got {}",
            cfg.maintenance.run_hour
        );
    }

    if cfg.maintenance.vacuum_hour > 23 {
        anyhow::bail!(
            "maintenance.vacuum_hour must be between 0 and 23, got {}",
            cfg.maintenance.vacuum_hour
        );
    }

    if cfg.maintenance.analyze_every_hours == 0 {
        anyhow::bail!("maintenance.analyze_every_hours must be greater than 0");
    }

    if cfg.maintenance.check_interval_secs == 0 {
        anyhow::bail!("maintenance.check_interval_secs must be greater than 0");
    }

    if cfg.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be greater than 0");
    }

    match cfg.logging.format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("logging.format must be 'text' or 'json', got '{}'", other),
    }

    if cfg.metrics.enabled {
        cfg.metrics.listen_addr()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config_requires_retention() {
        let mut cfg = create_test_config();
        cfg.retention.events_days = None;

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("retention.events_days must be configured"));
    }

    #[test]
    fn test_validate_config_rejects_unknown_dialect() {
        let mut cfg = create_test_config();
        cfg.database.dialect = Some("informix".to_string());

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("informix"));
    }

    #[test]
    fn test_validate_config_rejects_bad_hours() {
        let mut cfg = create_test_config();
        cfg.maintenance.run_hour = 24;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = create_test_config();
        cfg.maintenance.vacuum_hour = 30;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_config_rejects_zero_batch_size() {
        let mut cfg = create_test_config();
        cfg.ingest.batch_size = 0;

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("ingest.batch_size"));
    }

    #[test]
    fn test_validate_config_accepts_defaults_with_retention() {
        let cfg = create_test_config();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.retention.purge_timeout(), Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [retention]
            events_days = 14

            [database]
            url = "sqlite::memory:"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.retention.events_days, Some(14));
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.maintenance.run_hour, 3);
        assert_eq!(cfg.ingest.batch_size, 100);
        assert_eq!(cfg.logging.format, "text");
        assert!(!cfg.metrics.enabled);
    }

    fn create_test_config() -> Config {
        Config {
            database: DatabaseConfig::with_url("sqlite::memory:"),
            retention: RetentionConfig {
                events_days: Some(14),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
