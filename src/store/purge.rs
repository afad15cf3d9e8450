//! Retention purge and explicit bulk deletes
//!
//! Unlike the write path, every failure here propagates to the caller.

use super::EventStore;
use crate::error::{EventError, Result};
use crate::metrics;
use crate::sql::SqlBuilder;
use std::time::{Duration, Instant};

impl EventStore {
    /// Delete every event with `timestamp < cutoff`.
    ///
    /// Runs as one bulk delete in its own transaction bounded by `timeout`;
    /// an expired timeout rolls the transaction back.
    pub async fn purge(&self, cutoff: i64, timeout: Duration) -> Result<u64> {
        let started = Instant::now();
        tracing::info!(cutoff = cutoff, timeout_secs = timeout.as_secs(), "Purging events");

        let deleted = match tokio::time::timeout(timeout, self.purge_in_transaction(cutoff)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(
                    cutoff = cutoff,
                    timeout_secs = timeout.as_secs(),
                    "Event purge timed out, transaction rolled back"
                );
                return Err(EventError::PurgeTimeout(timeout));
            }
        };

        metrics::record_purge(deleted, started.elapsed());
        tracing::info!(
            cutoff = cutoff,
            deleted = deleted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Event purge completed"
        );

        Ok(deleted)
    }

    async fn purge_in_transaction(&self, cutoff: i64) -> Result<u64> {
        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("DELETE FROM events WHERE timestamp < ")
            .push_bind(cutoff);
        let statement = builder.finish();

        let mut tx = self.pool.begin().await?;
        let deleted = statement.query().execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;

        Ok(deleted)
    }

    /// Delete events by id; an empty list deletes nothing without SQL
    pub async fn delete_events(&self, event_ids: &[i64]) -> Result<u64> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("DELETE FROM events WHERE id IN (")
            .push_bind_list(event_ids.iter().copied())
            .push(")");
        let statement = builder.finish();

        let deleted = statement.query().execute(&self.pool).await?.rows_affected();
        tracing::info!(requested = event_ids.len(), deleted = deleted, "Events deleted");
        Ok(deleted)
    }

    pub async fn delete_all_events_for_endpoint(&self, endpoint_id: i64) -> Result<u64> {
        self.delete_all_events_for_endpoints(&[endpoint_id]).await
    }

    /// Delete every event reported by the given endpoints
    pub async fn delete_all_events_for_endpoints(&self, endpoint_ids: &[i64]) -> Result<u64> {
        if endpoint_ids.is_empty() {
            return Ok(0);
        }

        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("DELETE FROM events WHERE event_source_id IN (SELECT id FROM event_sources WHERE endpoint_id IN (")
            .push_bind_list(endpoint_ids.iter().copied())
            .push("))");
        let statement = builder.finish();

        let deleted = statement.query().execute(&self.pool).await?.rows_affected();
        tracing::info!(
            endpoints = endpoint_ids.len(),
            deleted = deleted,
            "Endpoint events deleted"
        );
        Ok(deleted)
    }

    /// Remove all sources of a definition together with their events.
    ///
    /// Returns the number of sources removed.
    pub async fn delete_event_sources_for_definition(&self, definition_id: i64) -> Result<u64> {
        let mut events = SqlBuilder::new(self.dialect());
        events
            .push("DELETE FROM events WHERE event_source_id IN (SELECT id FROM event_sources WHERE event_def_id = ")
            .push_bind(definition_id)
            .push(")");
        let events = events.finish();

        let mut sources = SqlBuilder::new(self.dialect());
        sources
            .push("DELETE FROM event_sources WHERE event_def_id = ")
            .push_bind(definition_id);
        let sources = sources.finish();

        let mut tx = self.pool.begin().await?;
        let events_deleted = events.query().execute(&mut *tx).await?.rows_affected();
        let sources_deleted = sources.query().execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;

        tracing::info!(
            definition_id = definition_id,
            sources_deleted = sources_deleted,
            events_deleted = events_deleted,
            "Event sources for definition deleted"
        );
        Ok(sources_deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageControl, Severity};
    use crate::store::test_support::{batch, seeded_store, source};
    use crate::store::EventFilter;

    const TIMEOUT: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_purge_deletes_before_cutoff() {
        let store = seeded_store().await;
        store
            .write(&batch(
                source(42, ""),
                &[
                    (1000, Severity::Info, "old"),
                    (5000, Severity::Info, "older than cutoff"),
                    (9000, Severity::Info, "recent"),
                ],
            ))
            .await;

        let deleted = store.purge(6000, TIMEOUT).await.unwrap();
        assert_eq!(deleted, 2);

        let page = store
            .find(&EventFilter::new(vec![42], 0, 10_000), PageControl::unlimited())
            .await;
        assert_eq!(page.total_rows, 1);
        assert_eq!(page.rows[0].timestamp, 9000);
    }

    #[tokio::test]
    async fn test_purge_keeps_event_at_cutoff() {
        let store = seeded_store().await;
        store
            .write(&batch(source(42, ""), &[(6000, Severity::Info, "boundary")]))
            .await;

        assert_eq!(store.purge(6000, TIMEOUT).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_failure_propagates() {
        let store = seeded_store().await;
        store.close().await;

        let result = store.purge(6000, TIMEOUT).await;
        assert!(matches!(result, Err(EventError::Database(_))));
    }

    #[tokio::test]
    async fn test_delete_events_by_id() {
        let store = seeded_store().await;
        store
            .write(&batch(
                source(42, ""),
                &[(1, Severity::Info, "a"), (2, Severity::Info, "b")],
            ))
            .await;
        let page = store
            .find(&EventFilter::new(vec![42], 0, 10), PageControl::unlimited())
            .await;

        assert_eq!(store.delete_events(&[]).await.unwrap(), 0);
        assert_eq!(
            store.delete_events(&[page.rows[0].event_id]).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_all_events_for_endpoint() {
        let store = seeded_store().await;
        store
            .write(&batch(source(42, "a"), &[(1, Severity::Info, "x")]))
            .await;
        store
            .write(&batch(source(43, "b"), &[(1, Severity::Info, "y")]))
            .await;

        assert_eq!(store.delete_all_events_for_endpoint(42).await.unwrap(), 1);
        let remaining = store
            .find(&EventFilter::new(vec![42, 43], 0, 10), PageControl::unlimited())
            .await;
        assert_eq!(remaining.total_rows, 1);
        assert_eq!(remaining.rows[0].endpoint_id, 43);
    }

    #[tokio::test]
    async fn test_delete_sources_for_definition_removes_events() {
        let store = seeded_store().await;
        let definition_id = store
            .register_event_definition("fileChanged", "Linux", "platform")
            .await
            .unwrap();
        store
            .write(&batch(source(42, "a"), &[(1, Severity::Info, "x")]))
            .await;

        assert_eq!(
            store
                .delete_event_sources_for_definition(definition_id)
                .await
                .unwrap(),
            1
        );
        let (events,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(events, 0);
    }
}
