//! Asynchronous ingest queue
//!
//! Reporting endpoints hand reports to an [`IngestQueue`] without waiting for
//! the database. A background task merges them into one [`EventBatch`] and
//! writes it when:
//! - `batch_size` reports are buffered
//! - the flush interval elapses
//! - a caller asks for an explicit flush
//! - every queue handle is dropped (final flush, then the task exits)

use crate::model::{EventBatch, EventRecord, EventSourceKey};
use crate::store::{EventStore, WriteSummary};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Events reported by one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub source: EventSourceKey,
    pub events: Vec<EventRecord>,
}

impl IngestReport {
    pub fn new(source: EventSourceKey, events: Vec<EventRecord>) -> Self {
        Self { source, events }
    }
}

/// Merge reports into a batch, deduplicating identical records per source
pub fn merge_reports(batch: &mut EventBatch, reports: impl IntoIterator<Item = IngestReport>) {
    for report in reports {
        batch.entry(report.source).or_default().extend(report.events);
    }
}

#[derive(Debug)]
enum IngestMessage {
    Report(IngestReport),
    Flush(oneshot::Sender<WriteSummary>),
}

/// Handle used to submit reports
#[derive(Clone)]
pub struct IngestQueue {
    sender: mpsc::UnboundedSender<IngestMessage>,
}

impl IngestQueue {
    /// Spawn the background writer task.
    ///
    /// The returned handle completes after the last queue handle is dropped
    /// and the final flush finished.
    ///
    /// ```ignore
    /// let (queue, task) = IngestQueue::spawn(store, 100, Duration::from_millis(100));
    /// queue.submit(report);  // Non-blocking
    /// drop(queue);
    /// task.await?;
    /// ```
    pub fn spawn(
        store: EventStore,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            ingest_task(store, rx, batch_size.max(1), flush_interval).await;
        });

        (Self { sender: tx }, handle)
    }

    /// Queue a report (non-blocking). Returns `false` if the task has stopped.
    pub fn submit(&self, report: IngestReport) -> bool {
        self.sender.send(IngestMessage::Report(report)).is_ok()
    }

    /// Write everything queued so far and return what the write did
    pub async fn flush(&self) -> Option<WriteSummary> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(IngestMessage::Flush(tx)).ok()?;
        rx.await.ok()
    }
}

async fn ingest_task(
    store: EventStore,
    mut rx: mpsc::UnboundedReceiver<IngestMessage>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut pending = EventBatch::new();
    let mut pending_reports = 0usize;

    let mut flush_timer = tokio::time::interval(flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(IngestMessage::Report(report)) => {
                    merge_reports(&mut pending, [report]);
                    pending_reports += 1;

                    if pending_reports >= batch_size {
                        flush(&store, &mut pending, &mut pending_reports).await;
                    }
                }
                Some(IngestMessage::Flush(reply)) => {
                    let summary = flush(&store, &mut pending, &mut pending_reports).await;
                    let _ = reply.send(summary);
                }
                None => {
                    flush(&store, &mut pending, &mut pending_reports).await;
                    break;
                }
            },

            _ = flush_timer.tick() => {
                if pending_reports > 0 {
                    flush(&store, &mut pending, &mut pending_reports).await;
                }
            }
        }
    }

    tracing::info!("Ingest task shutting down");
}

async fn flush(store: &EventStore, pending: &mut EventBatch, pending_reports: &mut usize) -> WriteSummary {
    if pending.is_empty() {
        *pending_reports = 0;
        return WriteSummary::default();
    }

    let batch = std::mem::take(pending);
    let reports = std::mem::take(pending_reports);
    let summary = store.write(&batch).await;

    tracing::debug!(
        reports = reports,
        sources = summary.sources,
        events_written = summary.events_written,
        "Flushed ingest batch"
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageControl, Severity};
    use crate::store::test_support::{seeded_store, source};
    use crate::store::EventFilter;

    fn report(endpoint_id: i64, ts: i64) -> IngestReport {
        IngestReport::new(
            source(endpoint_id, "/var/log/app.log"),
            vec![EventRecord::new(ts, Severity::Info, "line")],
        )
    }

    #[test]
    fn test_merge_reports_groups_by_source() {
        let mut batch = EventBatch::new();
        merge_reports(
            &mut batch,
            [report(42, 1), report(42, 2), report(42, 1), report(43, 1)],
        );

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[&source(42, "/var/log/app.log")].len(), 2);
    }

    #[tokio::test]
    async fn test_explicit_flush_writes_pending_reports() {
        let store = seeded_store().await;
        let (queue, _task) = IngestQueue::spawn(store.clone(), 100, Duration::from_secs(3600));

        assert!(queue.submit(report(42, 1000)));
        assert!(queue.submit(report(42, 2000)));
        assert!(queue.submit(report(43, 1000)));

        let summary = queue.flush().await.unwrap();
        assert_eq!(summary.sources, 2);
        assert_eq!(summary.events_written, 3);
    }

    #[tokio::test]
    async fn test_dropping_queue_flushes_remaining() {
        let store = seeded_store().await;
        let (queue, task) = IngestQueue::spawn(store.clone(), 100, Duration::from_secs(3600));

        queue.submit(report(42, 1000));
        drop(queue);
        task.await.unwrap();

        let page = store
            .find(&EventFilter::new(vec![42], 0, 10_000), PageControl::unlimited())
            .await;
        assert_eq!(page.total_rows, 1);
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let store = seeded_store().await;
        let (queue, _task) = IngestQueue::spawn(store.clone(), 2, Duration::from_secs(3600));

        queue.submit(report(42, 1000));
        queue.submit(report(42, 2000));
        // processed in order, so the size-triggered write is done by now
        let summary = queue.flush().await.unwrap();
        assert_eq!(summary, WriteSummary::default());

        let page = store
            .find(&EventFilter::new(vec![42], 0, 10_000), PageControl::unlimited())
            .await;
        assert_eq!(page.total_rows, 2);
    }
}
