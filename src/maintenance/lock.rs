//! Database-backed singleton job lock
//!
//! A job identity may have at most one live lease in `job_locks` across every
//! process sharing the database. Expired leases (a crashed holder) are
//! cleared on the next acquisition attempt.

use crate::error::{EventError, Result};
use crate::store::registry::SINGLE_ROW_MARKER;
use crate::store::{is_unique_violation, EventStore};
use crate::sql::SqlBuilder;
use sqlx::Row;
use std::future::Future;
use std::time::Duration;

#[derive(Clone)]
pub struct SingletonLock {
    store: EventStore,
    lease: Duration,
    owner: String,
}

/// A held lease; give it back with [`SingletonLock::release`]
#[derive(Debug)]
pub struct JobLease {
    pub job_name: String,
    pub owner: String,
    pub expires_at: i64,
}

impl SingletonLock {
    /// Lock handle with a fresh owner id for this process
    pub fn new(store: EventStore, lease: Duration) -> Self {
        Self {
            store,
            lease,
            owner: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Take the lease for `job_name` or fail with `JobAlreadyRunning`
    pub async fn acquire(&self, job_name: &str) -> Result<JobLease> {
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now + self.lease.as_millis() as i64;
        let dialect = self.store.dialect();

        let mut expire = SqlBuilder::new(dialect);
        expire
            .push("DELETE FROM job_locks WHERE job_name = ")
            .push_bind(job_name)
            .push(" AND expires_at < ")
            .push_bind(now);
        let expire = expire.finish();

        let mut insert = SqlBuilder::new(dialect);
        insert
            .push("INSERT INTO job_locks (job_name, owner, acquired_at, expires_at) SELECT ")
            .push_bind(job_name)
            .push(", ")
            .push_bind(self.owner.as_str())
            .push(", ")
            .push_bind(now)
            .push(", ")
            .push_bind(expires_at)
            .push(&format!(
                " FROM single_row sr WHERE sr.i = {} AND NOT EXISTS (SELECT 1 FROM job_locks jl WHERE jl.job_name = ",
                SINGLE_ROW_MARKER
            ))
            .push_bind(job_name)
            .push(")");
        let insert = insert.finish();

        let mut tx = self.store.pool().begin().await?;
        let expired = expire.query().execute(&mut *tx).await?.rows_affected();
        let inserted = match insert.query().execute(&mut *tx).await {
            Ok(result) => result.rows_affected(),
            // a concurrent acquire won the primary key
            Err(e) if is_unique_violation(&e) => 0,
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;

        if expired > 0 {
            tracing::warn!(job = job_name, "Cleared expired job lease");
        }

        if inserted == 0 {
            let holder = self.holder(job_name).await.unwrap_or_default();
            tracing::warn!(
                job = job_name,
                holder = holder.as_deref().unwrap_or("unknown"),
                "Job is already running, trigger rejected"
            );
            return Err(EventError::JobAlreadyRunning(job_name.to_string()));
        }

        tracing::debug!(job = job_name, owner = %self.owner, "Job lease acquired");

        Ok(JobLease {
            job_name: job_name.to_string(),
            owner: self.owner.clone(),
            expires_at,
        })
    }

    /// Current owner of a job's lease
    pub async fn holder(&self, job_name: &str) -> Result<Option<String>> {
        let mut builder = SqlBuilder::new(self.store.dialect());
        builder
            .push("SELECT owner FROM job_locks WHERE job_name = ")
            .push_bind(job_name);
        let statement = builder.finish();

        let owner: Option<String> = statement
            .query()
            .fetch_optional(self.store.pool())
            .await?
            .map(|row| row.try_get(0))
            .transpose()?;
        Ok(owner)
    }

    pub async fn release(&self, lease: JobLease) -> Result<()> {
        let mut builder = SqlBuilder::new(self.store.dialect());
        builder
            .push("DELETE FROM job_locks WHERE job_name = ")
            .push_bind(lease.job_name.as_str())
            .push(" AND owner = ")
            .push_bind(lease.owner.as_str());
        builder.finish().query().execute(self.store.pool()).await?;

        tracing::debug!(job = %lease.job_name, "Job lease released");
        Ok(())
    }

    /// Run `work` while holding the lease for `job_name`.
    ///
    /// The lease is released after `work` completes, whatever it returned.
    /// If this future is dropped before that, the release is spawned onto the
    /// runtime instead.
    pub async fn run_exclusive<F, T>(&self, job_name: &str, work: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let mut guard = LeaseGuard {
            lock: self,
            lease: Some(self.acquire(job_name).await?),
        };
        let output = work.await;

        if let Some(lease) = guard.lease.take() {
            if let Err(e) = self.release(lease).await {
                tracing::error!(job = job_name, error = %e, "Failed to release job lease");
            }
        }

        Ok(output)
    }
}

/// Releases a lease that `run_exclusive` did not get to release itself
struct LeaseGuard<'a> {
    lock: &'a SingletonLock,
    lease: Option<JobLease>,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let lock = self.lock.clone();
                tracing::warn!(job = %lease.job_name, "Job cancelled, releasing lease");
                runtime.spawn(async move {
                    let job = lease.job_name.clone();
                    if let Err(e) = lock.release(lease).await {
                        tracing::error!(job = %job, error = %e, "Failed to release job lease");
                    }
                });
            }
            Err(_) => tracing::warn!(
                job = %lease.job_name,
                expires_at = lease.expires_at,
                "Job cancelled outside a runtime, lease left to expire"
            ),
        }
    }
}
