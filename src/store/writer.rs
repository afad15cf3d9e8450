//! Batch event writer
//!
//! Writes are best-effort: a failing source is logged and skipped, the call
//! itself never fails. Reporting endpoints own retries.

use super::registry::push_source_predicate;
use super::{EventStore, SOURCE_DEFINITION_JOIN};
use crate::dialect::DialectAdapter;
use crate::error::Result;
use crate::metrics;
use crate::model::{EventBatch, EventRecord, EventSourceKey};
use crate::sql::{SqlBuilder, Statement};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;

/// Outcome of one [`EventStore::write`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Distinct sources in the batch
    pub sources: usize,
    pub events_written: u64,
    pub failed_sources: usize,
    /// Source registration failed and nothing was written
    pub registry_failed: bool,
}

impl WriteSummary {
    pub fn is_complete(&self) -> bool {
        !self.registry_failed && self.failed_sources == 0
    }
}

/// Insert of one event, resolving its source through the same name lookup as
/// the registry. An unregistered source inserts nothing.
pub fn event_insert(
    dialect: &dyn DialectAdapter,
    key: &EventSourceKey,
    record: &EventRecord,
) -> Statement {
    let id_expression = dialect.next_id_expression("events");

    let mut builder = SqlBuilder::new(dialect);
    builder.push("INSERT INTO events (");
    if id_expression.is_some() {
        builder.push("id, ");
    }
    builder.push("event_source_id, timestamp, severity, detail) SELECT ");
    if let Some(expr) = &id_expression {
        builder.push(expr).push(", ");
    }
    builder
        .push("es.id, ")
        .push_bind(record.timestamp)
        .push(", ")
        .push_bind(record.severity.as_str())
        .push(", ")
        .push_bind(record.detail.as_str())
        .push(" FROM event_sources es ")
        .push(SOURCE_DEFINITION_JOIN)
        .push(" WHERE ");
    push_source_predicate(&mut builder, key);
    builder.finish()
}

impl EventStore {
    /// Write events grouped by source.
    ///
    /// 1. every source is registered in one transaction; on failure the whole
    ///    batch is dropped
    /// 2. each source's events are inserted in their own transaction
    /// 3. after a successful insert the correlation notifier is called once
    ///    for that source; its errors are logged and never undo the write
    pub async fn write(&self, batch: &EventBatch) -> WriteSummary {
        let mut summary = WriteSummary {
            sources: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return summary;
        }

        let started = Instant::now();

        if let Err(e) = self.ensure_sources(batch.keys()).await {
            tracing::error!(
                error = %e,
                sources = batch.len(),
                "Failed to register event sources, dropping batch"
            );
            metrics::record_ingest_failure("registry");
            summary.registry_failed = true;
            return summary;
        }

        for (source, records) in batch {
            if records.is_empty() {
                continue;
            }

            match self.insert_source_events(source, records).await {
                Ok(0) => {
                    tracing::warn!(
                        source = %source,
                        events = records.len(),
                        "Event source is not registered (unknown definition?), events dropped"
                    );
                    metrics::record_ingest_failure("source");
                    summary.failed_sources += 1;
                }
                Ok(written) => {
                    summary.events_written += written;
                    let events: Vec<EventRecord> = records.iter().cloned().collect();
                    self.notify_correlation(source, &events).await;
                }
                Err(e) => {
                    tracing::error!(
                        source = %source,
                        events = records.len(),
                        error = %e,
                        "Failed to write events for source"
                    );
                    metrics::record_ingest_failure("source");
                    summary.failed_sources += 1;
                }
            }
        }

        metrics::record_events_ingested(summary.events_written);

        tracing::debug!(
            sources = summary.sources,
            events_written = summary.events_written,
            failed_sources = summary.failed_sources,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Event batch written"
        );

        summary
    }

    async fn insert_source_events(
        &self,
        source: &EventSourceKey,
        records: &BTreeSet<EventRecord>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for record in records {
            let statement = event_insert(self.dialect(), source, record);
            written += statement.query().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn notify_correlation(&self, source: &EventSourceKey, events: &[EventRecord]) {
        match self.notifier.notify(source, events).await {
            Ok(stats) => {
                tracing::debug!(source = %source, stats = %stats, "Correlation notified");
            }
            Err(e) => {
                tracing::warn!(
                    source = %source,
                    events = events.len(),
                    error = %e,
                    "Correlation notifier failed, events kept"
                );
                metrics::record_correlation_failure();
            }
        }
    }
}
