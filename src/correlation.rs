//! Correlation notifier seam
//!
//! After each source's events are written, the batch writer hands the source
//! and its events to a [`CorrelationNotifier`] (typically an alert-condition
//! engine). The call is awaited in line, its statistics are logged, and any
//! error is logged and dropped: the write is never rolled back.

use crate::model::{EventRecord, EventSourceKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Processing statistics reported by a notifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub events_checked: usize,
    pub conditions_matched: usize,
    pub elapsed_ms: u64,
}

impl fmt::Display for CorrelationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CorrelationStats[checked={}, matched={}, elapsed={}ms]",
            self.events_checked, self.conditions_matched, self.elapsed_ms
        )
    }
}

#[async_trait]
pub trait CorrelationNotifier: Send + Sync {
    /// Inspect newly written events of one source
    async fn notify(
        &self,
        source: &EventSourceKey,
        events: &[EventRecord],
    ) -> anyhow::Result<CorrelationStats>;
}

/// Notifier that does nothing; used when no correlation engine is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl CorrelationNotifier for NoopNotifier {
    async fn notify(
        &self,
        _source: &EventSourceKey,
        events: &[EventRecord],
    ) -> anyhow::Result<CorrelationStats> {
        Ok(CorrelationStats {
            events_checked: events.len(),
            ..Default::default()
        })
    }
}

/// A written batch as seen by a downstream consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationBatch {
    pub source: EventSourceKey,
    pub events: Vec<EventRecord>,
}

/// Streams every written batch to an external consumer over a channel.
///
/// ```ignore
/// let (notifier, mut rx) = ChannelNotifier::new();
/// tokio::spawn(async move {
///     while let Some(batch) = rx.recv().await {
///         alert_engine.check(batch).await;
///     }
/// });
/// ```
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<CorrelationBatch>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CorrelationBatch>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl CorrelationNotifier for ChannelNotifier {
    async fn notify(
        &self,
        source: &EventSourceKey,
        events: &[EventRecord],
    ) -> anyhow::Result<CorrelationStats> {
        self.sender
            .send(CorrelationBatch {
                source: source.clone(),
                events: events.to_vec(),
            })
            .map_err(|_| anyhow::anyhow!("correlation consumer has shut down"))?;

        Ok(CorrelationStats {
            events_checked: events.len(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    fn source() -> EventSourceKey {
        EventSourceKey::new("logEntry", "Linux", "platform", 1, "/var/log/syslog")
    }

    #[tokio::test]
    async fn test_channel_notifier_forwards_batch() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let events = vec![
            EventRecord::new(1, Severity::Warn, "disk 91% full"),
            EventRecord::new(2, Severity::Error, "disk 99% full"),
        ];

        let stats = notifier.notify(&source(), &events).await.unwrap();
        assert_eq!(stats.events_checked, 2);

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.source, source());
        assert_eq!(batch.events, events);
    }

    #[tokio::test]
    async fn test_channel_notifier_reports_closed_consumer() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);

        let result = notifier
            .notify(&source(), &[EventRecord::new(1, Severity::Info, "x")])
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_stats_display() {
        let stats = CorrelationStats {
            events_checked: 3,
            conditions_matched: 1,
            elapsed_ms: 4,
        };
        assert_eq!(
            stats.to_string(),
            "CorrelationStats[checked=3, matched=1, elapsed=4ms]"
        );
    }
}
