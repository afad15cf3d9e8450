//! Background maintenance scheduling
//!
//! The loop wakes every `check_interval_secs`. In `run_hour` it runs the
//! whole pipeline once per day; in other hours it runs only the database
//! statistics stage. Every run holds the singleton lease for
//! [`PIPELINE_JOB`], so overlapping triggers from any process are rejected.
//!
//! [`MaintenanceTask::shutdown`] stops the loop between runs. A run already
//! in progress finishes and releases its lease first.

use super::lock::SingletonLock;
use super::pipeline::{MaintenancePipeline, PipelineReport, StageKind};
use crate::config::MaintenanceConfig;
use crate::error::{EventError, Result};
use chrono::{Datelike, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

/// Lock identity shared by every pipeline trigger
pub const PIPELINE_JOB: &str = "data-purge";

/// Handle to the background maintenance loop
pub struct MaintenanceTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MaintenanceTask {
    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Maintenance task ended abnormally");
        }
        tracing::info!("Maintenance scheduler stopped");
    }
}

/// Spawn the background maintenance loop
///
/// ```ignore
/// let lock = SingletonLock::new(store.clone(), Duration::from_secs(12 * 3600));
/// let task = spawn_maintenance_task(Arc::new(pipeline), lock, config.maintenance.clone());
/// // ...
/// task.shutdown().await;
/// ```
pub fn spawn_maintenance_task(
    pipeline: Arc<MaintenancePipeline>,
    lock: SingletonLock,
    config: MaintenanceConfig,
) -> MaintenanceTask {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        maintenance_loop(pipeline, lock, config, shutdown_rx).await;
    });
    MaintenanceTask { shutdown, handle }
}

async fn maintenance_loop(
    pipeline: Arc<MaintenancePipeline>,
    lock: SingletonLock,
    config: MaintenanceConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval(Duration::from_secs(config.check_interval_secs.max(1)));
    let mut last_run_day: Option<u32> = None;

    loop {
        // runs are never raced against shutdown, only the wait between them
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        let now = chrono::Local::now();
        let current_hour = now.hour();
        let current_day = now.ordinal();

        if current_hour == config.run_hour && Some(current_day) != last_run_day {
            tracing::info!(run_hour = config.run_hour, "Starting scheduled maintenance");

            match run_pipeline_now(&pipeline, &lock).await {
                Ok(_) => last_run_day = Some(current_day),
                Err(EventError::JobAlreadyRunning(_)) => {
                    // another instance owns today's run
                    last_run_day = Some(current_day);
                }
                Err(e) => tracing::error!(error = %e, "Scheduled maintenance failed"),
            }
        } else {
            match lock
                .run_exclusive(
                    PIPELINE_JOB,
                    pipeline.run_matching(|kind| kind == StageKind::DatabaseStatistics),
                )
                .await
            {
                Ok(_) | Err(EventError::JobAlreadyRunning(_)) => {}
                Err(e) => tracing::error!(error = %e, "Hourly database maintenance failed"),
            }
        }
    }
}

/// Run the full pipeline immediately under the singleton lease.
///
/// Stage failures are reported inside the returned report; an error means
/// the pipeline could not run at all.
pub async fn run_pipeline_now(
    pipeline: &MaintenancePipeline,
    lock: &SingletonLock,
) -> Result<PipelineReport> {
    let report = lock.run_exclusive(PIPELINE_JOB, pipeline.run()).await?;

    tracing::info!(
        stages = report.stages.len(),
        failed = report.failures().count(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Maintenance run completed"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::pipeline::{MaintenanceStage, StageOutcome};
    use crate::store::EventStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SlowStage {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MaintenanceStage for SlowStage {
        fn kind(&self) -> StageKind {
            StageKind::EventPurge
        }

        async fn run(&self) -> anyhow::Result<StageOutcome> {
            time::sleep(Duration::from_millis(300)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(StageOutcome::affected(1))
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_run_and_releases_lease() {
        let store = EventStore::open("sqlite::memory:").await.unwrap();
        let lock = SingletonLock::new(store.clone(), Duration::from_secs(3600));
        let observer = SingletonLock::new(store, Duration::from_secs(3600));
        let finished = Arc::new(AtomicBool::new(false));
        let pipeline = MaintenancePipeline::new().with_stage(Arc::new(SlowStage {
            finished: finished.clone(),
        }));
        let config = MaintenanceConfig {
            run_hour: chrono::Local::now().hour(),
            check_interval_secs: 3600,
            ..MaintenanceConfig::default()
        };

        let task = spawn_maintenance_task(Arc::new(pipeline), lock.clone(), config);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            observer.holder(PIPELINE_JOB).await.unwrap().as_deref(),
            Some(lock.owner())
        );

        task.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(observer.holder(PIPELINE_JOB).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shutdown_of_idle_loop_returns_promptly() {
        let store = EventStore::open("sqlite::memory:").await.unwrap();
        let lock = SingletonLock::new(store, Duration::from_secs(3600));
        let config = MaintenanceConfig {
            check_interval_secs: 3600,
            ..MaintenanceConfig::default()
        };

        let task = spawn_maintenance_task(Arc::new(MaintenancePipeline::new()), lock.clone(), config);
        time::sleep(Duration::from_millis(50)).await;

        time::timeout(Duration::from_secs(5), task.shutdown())
            .await
            .unwrap();
        assert_eq!(lock.holder(PIPELINE_JOB).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_now_is_rejected_while_job_is_held() {
        let store = EventStore::open("sqlite::memory:").await.unwrap();
        let lock = SingletonLock::new(store.clone(), Duration::from_secs(60));
        let other_instance = SingletonLock::new(store, Duration::from_secs(60));
        let pipeline = MaintenancePipeline::new();

        let lease = other_instance.acquire(PIPELINE_JOB).await.unwrap();
        let rejected = run_pipeline_now(&pipeline, &lock).await;
        assert!(matches!(rejected, Err(EventError::JobAlreadyRunning(_))));

        other_instance.release(lease).await.unwrap();
        let report = run_pipeline_now(&pipeline, &lock).await.unwrap();
        assert!(report.all_succeeded());
    }
}
