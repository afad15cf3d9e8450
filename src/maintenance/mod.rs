//! Scheduled data maintenance
//!
//! - `pipeline`: ordered stages with per-stage failure isolation
//! - `stages`: event purge and database statistics stages
//! - `lock`: database-backed singleton job lease
//! - `scheduler`: daily background loop and manual trigger

pub mod lock;
pub mod pipeline;
pub mod scheduler;
pub mod stages;

pub use lock::{JobLease, SingletonLock};
pub use pipeline::{
    MaintenancePipeline, MaintenanceStage, PipelineReport, StageKind, StageOutcome, StageReport,
};
pub use scheduler::{run_pipeline_now, spawn_maintenance_task, MaintenanceTask, PIPELINE_JOB};
pub use stages::{DatabaseMaintenanceStage, EventPurgeStage, MaintenancePlan};

use crate::config::Config;
use crate::error::Result;
use crate::store::EventStore;
use std::sync::Arc;
use std::time::Duration;

/// Pipeline with the stages this engine owns: event purge and database statistics.
///
/// Stages owned by other data domains are added with
/// [`MaintenancePipeline::with_stage`].
pub fn standard_pipeline(store: &EventStore, config: &Config) -> Result<MaintenancePipeline> {
    let purge = EventPurgeStage::new(store.clone(), &config.retention)?;
    let database = DatabaseMaintenanceStage::new(store.clone(), config.maintenance.clone());

    Ok(MaintenancePipeline::new()
        .with_stage(Arc::new(purge))
        .with_stage(Arc::new(database)))
}

/// Singleton lock configured with the maintenance lease length
pub fn pipeline_lock(store: &EventStore, config: &Config) -> SingletonLock {
    SingletonLock::new(
        store.clone(),
        Duration::from_secs(config.maintenance.lock_lease_secs),
    )
}
