use std::time::Duration;

/// Errors surfaced by the event engine.
///
/// Ingestion and query faults never reach callers through this type; they are
/// logged and degraded inside the store. What remains are the faults a caller
/// must see: authorization, configuration, retention and explicit deletes.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Caller lacks visibility into the requested scope
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Fatal configuration problem (unknown dialect, missing retention, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The endpoint inventory could not expand a group scope
    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The purge transaction exceeded its configured timeout
    #[error("Purge did not finish within {0:?}")]
    PurgeTimeout(Duration),

    /// A singleton job was triggered while another instance holds its lock
    #[error("Job '{0}' is already running")]
    JobAlreadyRunning(String),
}

impl EventError {
    /// Short machine-readable name, used as a metrics/log label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Migration(_) => "migration",
            Self::Permission(_) => "permission",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::Inventory(_) => "inventory",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::PurgeTimeout(_) => "purge_timeout",
            Self::JobAlreadyRunning(_) => "job_already_running",
        }
    }
}

pub type Result<T> = std::result::Result<T, EventError>;
