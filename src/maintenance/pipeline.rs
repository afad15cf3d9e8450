//! Maintenance pipeline with per-stage failure isolation
//!
//! Stages run in the fixed order of [`StageKind`]. Each one runs in its own
//! task, so an error or a panic is recorded against that stage and the
//! pipeline moves on to the next.

use crate::metrics;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline position of a stage; declaration order is execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Compression,
    EventPurge,
    AlertPurge,
    TraitPurge,
    AvailabilityPurge,
    DatabaseStatistics,
    BaselineCalculation,
    SeverityBuckets,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compression => "compression",
            Self::EventPurge => "event_purge",
            Self::AlertPurge => "alert_purge",
            Self::TraitPurge => "trait_purge",
            Self::AvailabilityPurge => "availability_purge",
            Self::DatabaseStatistics => "database_statistics",
            Self::BaselineCalculation => "baseline_calculation",
            Self::SeverityBuckets => "severity_buckets",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a stage did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    /// Rows deleted, compressed or refreshed
    pub affected: u64,
    pub note: Option<String>,
}

impl StageOutcome {
    pub fn affected(affected: u64) -> Self {
        Self {
            affected,
            note: None,
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        Self {
            affected: 0,
            note: Some(note.into()),
        }
    }
}

#[async_trait]
pub trait MaintenanceStage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self) -> anyhow::Result<StageOutcome>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub kind: StageKind,
    pub elapsed: Duration,
    /// Error message on failure
    pub result: std::result::Result<StageOutcome, String>,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn failures(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| !s.succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.kind == kind)
    }
}

#[derive(Clone, Default)]
pub struct MaintenancePipeline {
    stages: Vec<Arc<dyn MaintenanceStage>>,
}

impl MaintenancePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage; stages of the same kind keep insertion order
    pub fn with_stage(mut self, stage: Arc<dyn MaintenanceStage>) -> Self {
        self.stages.push(stage);
        self.stages.sort_by_key(|s| s.kind());
        self
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    pub async fn run(&self) -> PipelineReport {
        self.run_matching(|_| true).await
    }

    /// Run only the stages whose kind satisfies `select`
    pub async fn run_matching<F>(&self, select: F) -> PipelineReport
    where
        F: Fn(StageKind) -> bool,
    {
        let started = Instant::now();
        let mut report = PipelineReport::default();

        tracing::info!(stages = self.stages.len(), "Maintenance pipeline starting");

        for stage in self.stages.iter().filter(|s| select(s.kind())) {
            report.stages.push(run_stage(stage.clone()).await);
        }

        report.elapsed = started.elapsed();
        let failed = report.failures().count();

        tracing::info!(
            stages = report.stages.len(),
            failed = failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Maintenance pipeline finished"
        );

        report
    }
}

async fn run_stage(stage: Arc<dyn MaintenanceStage>) -> StageReport {
    let kind = stage.kind();
    let started = Instant::now();
    tracing::info!(stage = %kind, "Maintenance stage starting");

    let result = match tokio::spawn(async move { stage.run().await }).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(join_error) if join_error.is_panic() => Err("stage panicked".to_string()),
        Err(join_error) => Err(join_error.to_string()),
    };

    let elapsed = started.elapsed();
    metrics::record_stage(kind.name(), elapsed, result.is_err());

    match &result {
        Ok(outcome) => tracing::info!(
            stage = %kind,
            affected = outcome.affected,
            note = outcome.note.as_deref().unwrap_or(""),
            elapsed_ms = elapsed.as_millis() as u64,
            "Maintenance stage completed"
        ),
        Err(e) => tracing::error!(
            stage = %kind,
            error = %e,
            elapsed_ms = elapsed.as_millis() as u64,
            "Maintenance stage failed, continuing with next stage"
        ),
    }

    StageReport {
        kind,
        elapsed,
        result,
    }
}
