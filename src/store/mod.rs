//! Relational event store
//!
//! This module owns the connection pool and every SQL statement the engine
//! issues:
//! - `registry`: deduplicating event source registration
//! - `writer`: batch event writes with correlation fan-out
//! - `query`: filtered, paged event queries and bucket inputs
//! - `purge`: retention purge and explicit bulk deletes
//! - `catalog`: endpoint type, definition and endpoint metadata
//!
//! Statements are rendered through the configured [`DialectAdapter`]. The
//! bundled executor is the sqlx SQLite driver.

mod catalog;
mod purge;
pub mod query;
pub mod registry;
pub mod writer;

pub use query::EventFilter;
pub use writer::WriteSummary;

use crate::config::DatabaseConfig;
use crate::correlation::{CorrelationNotifier, NoopNotifier};
use crate::dialect::{self, DialectAdapter, DialectKind};
use crate::error::{EventError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Join path from an event source to the names that identify its definition
pub(crate) const SOURCE_DEFINITION_JOIN: &str = "JOIN event_definitions ed ON ed.id = es.event_def_id \
     JOIN endpoint_types et ON et.id = ed.endpoint_type_id";

/// Event store handle
///
/// Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
    dialect: Arc<dyn DialectAdapter>,
    notifier: Arc<dyn CorrelationNotifier>,
}

impl EventStore {
    /// Connect, run migrations and resolve the dialect.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = EventStore::connect(&DatabaseConfig::with_url("sqlite:./data/events.db")).await?;
    /// ```
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let dialect = dialect::resolve(config.dialect.as_deref(), &config.url)?;
        if dialect.kind() != DialectKind::Sqlite {
            return Err(EventError::Config(format!(
                "Dialect '{}' can be rendered but not executed; only sqlite URLs can be opened",
                dialect.kind()
            )));
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .foreign_keys(true)
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.busy_timeout_secs))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(
            url = %config.url,
            dialect = %dialect.kind(),
            max_connections = config.max_connections,
            "Event store ready"
        );

        Ok(Self {
            pool,
            dialect,
            notifier: Arc::new(NoopNotifier),
        })
    }

    /// Connect with default pool settings
    pub async fn open(url: &str) -> Result<Self> {
        Self::connect(&DatabaseConfig::with_url(url)).await
    }

    /// Attach the collaborator told about every written source
    pub fn with_notifier(mut self, notifier: Arc<dyn CorrelationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn dialect(&self) -> &dyn DialectAdapter {
        self.dialect.as_ref()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// True when `error` is a unique or primary key constraint violation
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_database_runs_migrations() {
        let store = EventStore::open("sqlite::memory:").await.unwrap();

        let (marker,): (i64,) = sqlx::query_as("SELECT i FROM single_row")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(marker, 42);
        assert_eq!(store.dialect().kind(), DialectKind::Sqlite);
    }

    #[tokio::test]
    async fn test_non_sqlite_dialect_is_rejected_at_connect() {
        let result = EventStore::open("postgres://localhost/events").await;
        assert!(matches!(result, Err(EventError::Config(_))));

        let mut config = DatabaseConfig::with_url("sqlite::memory:");
        config.dialect = Some("oracle".to_string());
        assert!(matches!(
            EventStore::connect(&config).await,
            Err(EventError::Config(_))
        ));
    }
}
