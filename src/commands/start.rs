use anyhow::Result;
use colored::Colorize;
use event_engine::config;
use event_engine::correlation::ChannelNotifier;
use event_engine::ingest::{IngestQueue, IngestReport};
use event_engine::maintenance::{self, spawn_maintenance_task};
use event_engine::metrics;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

/// Execute the start command
///
/// Reads newline-delimited JSON reports from stdin into the ingest queue and
/// runs the maintenance scheduler until stdin closes or a shutdown signal
/// arrives.
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    if cfg.metrics.enabled {
        metrics::init_metrics(cfg.metrics.listen_addr()?)?;
    }

    let (notifier, mut correlated) = ChannelNotifier::new();
    let store = super::open_store(&cfg)
        .await?
        .with_notifier(Arc::new(notifier));

    let correlation_task = tokio::spawn(async move {
        while let Some(batch) = correlated.recv().await {
            debug!(
                source = %batch.source,
                events = batch.events.len(),
                "Events handed to correlation"
            );
        }
    });

    let pipeline = Arc::new(maintenance::standard_pipeline(&store, &cfg)?);
    let lock = maintenance::pipeline_lock(&store, &cfg);
    let maintenance_task = spawn_maintenance_task(pipeline, lock, cfg.maintenance.clone());

    let (queue, ingest_task) = IngestQueue::spawn(
        store.clone(),
        cfg.ingest.batch_size,
        cfg.ingest.flush_interval(),
    );

    println!("{}", "Event engine started".green().bold());
    println!("  Database: {}", cfg.database.url);
    println!(
        "  Retention: {} days",
        cfg.retention.events_days.unwrap_or_default()
    );
    println!("  Maintenance hour: {}", cfg.maintenance.run_hour);
    println!();
    println!("{}", "Reading JSON reports from stdin (Ctrl+C to stop)".dimmed());

    let counts = read_reports(
        BufReader::new(tokio::io::stdin()),
        &queue,
        shutdown_signal(),
    )
    .await;

    // Dropping the last queue handle triggers the final flush
    drop(queue);
    ingest_task.await?;
    maintenance_task.shutdown().await;
    store.close().await;
    // the correlation consumer ends once the last store handle is gone
    drop(store);
    correlation_task.await?;

    println!();
    println!("{}", "Event engine stopped".yellow());
    println!("  Reports accepted: {}", counts.accepted);
    println!("  Reports rejected: {}", counts.rejected);

    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReportCounts {
    accepted: u64,
    rejected: u64,
}

/// Feed newline-delimited JSON reports into `queue` until input ends, a read
/// fails or `shutdown` resolves.
///
/// Lines that are not UTF-8 or not a report are counted as rejected.
async fn read_reports<R, S>(reader: R, queue: &IngestQueue, shutdown: S) -> ReportCounts
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = Result<()>>,
{
    let mut lines = reader.split(b'\n');
    let mut counts = ReportCounts::default();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            segment = lines.next_segment() => match segment {
                Ok(Some(bytes)) => {
                    let line = match String::from_utf8(bytes) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(error = %e, "Skipping report that is not valid UTF-8");
                            counts.rejected += 1;
                            continue;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<IngestReport>(&line) {
                        Ok(report) => {
                            if queue.submit(report) {
                                counts.accepted += 1;
                            } else {
                                warn!("Ingest queue stopped, report dropped");
                                counts.rejected += 1;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Skipping malformed report");
                            counts.rejected += 1;
                        }
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Reading input failed, shutting down");
                    break;
                }
            },
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => warn!(error = %e, "Signal handling failed, shutting down"),
                }
                break;
            }
        }
    }

    counts
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_engine::{EventRecord, EventSourceKey, EventStore, Severity};
    use std::time::Duration;

    async fn store() -> EventStore {
        let store = EventStore::open("sqlite::memory:").await.unwrap();
        store
            .register_event_definition("logEntry", "Linux", "platform")
            .await
            .unwrap();
        store
            .register_endpoint(42, "web-01", "Linux", "platform")
            .await
            .unwrap();
        store
    }

    fn report_line(timestamp: i64) -> String {
        let report = IngestReport::new(
            EventSourceKey::new("logEntry", "Linux", "platform", 42, "/var/log/app.log"),
            vec![EventRecord::new(timestamp, Severity::Warn, "disk filling up")],
        );
        serde_json::to_string(&report).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_rejected_and_reading_continues() {
        let store = store().await;
        let (queue, task) = IngestQueue::spawn(store.clone(), 100, Duration::from_secs(60));

        let mut input = Vec::new();
        input.extend_from_slice(b"{\"source\": \"\xff\xfe\"}\n");
        input.extend_from_slice(b"not json\r\n");
        input.extend_from_slice(b"\n");
        input.extend_from_slice(report_line(1000).as_bytes());
        input.push(b'\n');
        input.extend_from_slice(report_line(2000).as_bytes());

        let counts = read_reports(&input[..], &queue, std::future::pending()).await;
        assert_eq!(
            counts,
            ReportCounts {
                accepted: 2,
                rejected: 2
            }
        );

        drop(queue);
        task.await.unwrap();
        let written = store.event_counts_by_severity(42, 0, 4000).await.unwrap();
        assert_eq!(written[&Severity::Warn], 2);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_reading() {
        let store = store().await;
        let (queue, task) = IngestQueue::spawn(store, 100, Duration::from_secs(60));
        let (_writer, reader) = tokio::io::duplex(64);

        let counts = tokio::time::timeout(
            Duration::from_secs(5),
            read_reports(BufReader::new(reader), &queue, async { Ok::<(), anyhow::Error>(()) }),
        )
        .await
        .unwrap();
        assert_eq!(counts, ReportCounts::default());

        drop(queue);
        task.await.unwrap();
    }
}
