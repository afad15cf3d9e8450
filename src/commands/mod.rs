//! Command implementations for the CLI
//!
//! - start: run the ingest queue and the maintenance scheduler
//! - ingest: load a report document
//! - query: filtered event listing
//! - buckets: timeline buckets for one endpoint
//! - purge: retention purge
//! - maintenance: one pipeline run
//! - sql: statement rendering per dialect
//! - config: configuration display and validation

pub mod buckets;
pub mod config;
pub mod ingest;
pub mod maintenance;
pub mod purge;
pub mod query;
pub mod sql;
pub mod start;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use event_engine::config::Config;
use event_engine::{EventStore, Severity};
use std::path::Path;

/// Open the configured store, creating the database directory if needed
pub async fn open_store(cfg: &Config) -> Result<EventStore> {
    if let Some(path) = sqlite_file_path(&cfg.database.url) {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
    }

    Ok(EventStore::connect(&cfg.database).await?)
}

fn sqlite_file_path(url: &str) -> Option<&str> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        None
    } else {
        Some(path)
    }
}

/// Resolve an optional `[begin, end)` window, defaulting to the last `since_secs`
pub fn time_window(begin: Option<i64>, end: Option<i64>, since_secs: u64) -> (i64, i64) {
    let end = end.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    let since_ms = i64::try_from(since_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    let begin = begin.unwrap_or_else(|| end.saturating_sub(since_ms));
    (begin, end)
}

pub fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

pub fn colored_severity(severity: Severity) -> ColoredString {
    let name = severity.as_str();
    match severity {
        Severity::Fatal => name.red().bold(),
        Severity::Error => name.red(),
        Severity::Warn => name.yellow().bold(),
        Severity::Info => name.green(),
        Severity::Debug => name.blue(),
    }
}
