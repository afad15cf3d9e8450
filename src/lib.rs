pub mod authz;
pub mod buckets;
pub mod config;
pub mod correlation;
pub mod dialect;
pub mod error;
pub mod ingest;
pub mod inventory;
pub mod maintenance;
pub mod metrics;
pub mod model;
pub mod service;
pub mod sql;
pub mod store;

pub use error::{EventError, Result};
pub use model::{EventBatch, EventComposite, EventRecord, EventSourceKey, Page, PageControl, Severity};
pub use service::{EventCriteria, EventScope, EventService};
pub use store::{EventFilter, EventStore, WriteSummary};

use config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the configured level. This function can only be
/// called once.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
