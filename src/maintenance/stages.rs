//! Built-in maintenance stages for the event store

use super::pipeline::{MaintenanceStage, StageKind, StageOutcome};
use crate::config::{MaintenanceConfig, RetentionConfig};
use crate::error::{EventError, Result};
use crate::store::EventStore;
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use std::time::Duration;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Deletes events older than the retention window
pub struct EventPurgeStage {
    store: EventStore,
    retention_days: u32,
    timeout: Duration,
}

impl EventPurgeStage {
    /// Fails if no retention window is configured
    pub fn new(store: EventStore, retention: &RetentionConfig) -> Result<Self> {
        let retention_days = retention.events_days.ok_or_else(|| {
            EventError::Config("retention.events_days must be configured".to_string())
        })?;

        Ok(Self {
            store,
            retention_days,
            timeout: retention.purge_timeout(),
        })
    }

    /// Retention cutoff in Unix milliseconds relative to `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - i64::from(self.retention_days) * MILLIS_PER_DAY
    }

    /// Purge relative to `now`
    pub async fn purge_at(&self, now: DateTime<Utc>) -> Result<u64> {
        self.store.purge(self.cutoff(now), self.timeout).await
    }
}

#[async_trait]
impl MaintenanceStage for EventPurgeStage {
    fn kind(&self) -> StageKind {
        StageKind::EventPurge
    }

    async fn run(&self) -> anyhow::Result<StageOutcome> {
        let deleted = self.purge_at(Utc::now()).await?;
        Ok(StageOutcome::affected(deleted))
    }
}

/// Which database housekeeping commands are due
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenancePlan {
    pub analyze: bool,
    pub vacuum: bool,
    pub reindex: bool,
}

impl MaintenancePlan {
    pub fn is_empty(&self) -> bool {
        !self.analyze && !self.vacuum && !self.reindex
    }
}

/// Refreshes planner statistics and compacts the database file
pub struct DatabaseMaintenanceStage {
    store: EventStore,
    config: MaintenanceConfig,
}

impl DatabaseMaintenanceStage {
    pub fn new(store: EventStore, config: MaintenanceConfig) -> Self {
        Self { store, config }
    }

    /// `ANALYZE` every `analyze_every_hours`; `VACUUM` and optionally
    /// `REINDEX` in `vacuum_hour`.
    pub fn plan_for_hour(&self, hour: u32) -> MaintenancePlan {
        let every = self.config.analyze_every_hours.max(1);
        let vacuum = hour == self.config.vacuum_hour;
        MaintenancePlan {
            analyze: hour % every == 0,
            vacuum,
            reindex: vacuum && self.config.reindex_nightly,
        }
    }

    pub async fn execute(&self, plan: MaintenancePlan) -> Result<Vec<&'static str>> {
        let mut done = Vec::new();

        // VACUUM cannot run inside a transaction
        if plan.vacuum {
            sqlx::query("VACUUM").execute(self.store.pool()).await?;
            done.push("vacuum");
        }
        if plan.reindex {
            sqlx::query("REINDEX").execute(self.store.pool()).await?;
            done.push("reindex");
        }
        if plan.analyze {
            sqlx::query("ANALYZE").execute(self.store.pool()).await?;
            done.push("analyze");
        }

        Ok(done)
    }
}

#[async_trait]
impl MaintenanceStage for DatabaseMaintenanceStage {
    fn kind(&self) -> StageKind {
        StageKind::DatabaseStatistics
    }

    async fn run(&self) -> anyhow::Result<StageOutcome> {
        let hour = chrono::Local::now().hour();
        let plan = self.plan_for_hour(hour);
        if plan.is_empty() {
            return Ok(StageOutcome::note(format!("nothing due at hour {}", hour)));
        }

        let done = self.execute(plan).await?;
        Ok(StageOutcome::note(done.join(", ")))
    }
}
