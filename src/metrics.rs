use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a tokio runtime. Fails if a recorder is
/// already installed.
pub fn init_metrics(listen: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    tracing::info!(listen = %listen, "Prometheus exporter listening");
    Ok(())
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "events_ingested_total",
        "Total number of events written to storage"
    );
    describe_counter!(
        "event_ingest_failures_total",
        "Ingestion faults by stage (registry, source)"
    );
    describe_counter!(
        "correlation_failures_total",
        "Correlation notifier calls that returned an error"
    );
    describe_histogram!(
        "event_query_duration_seconds",
        "Event query duration in seconds"
    );
    describe_counter!(
        "event_query_failures_total",
        "Event queries that degraded to an empty page"
    );
    describe_histogram!(
        "event_purge_duration_seconds",
        "Retention purge duration in seconds"
    );
    describe_counter!(
        "events_purged_total",
        "Total number of events deleted by retention purges"
    );
    describe_histogram!(
        "maintenance_stage_duration_seconds",
        "Maintenance stage duration in seconds"
    );
    describe_counter!(
        "maintenance_stage_failures_total",
        "Maintenance stages that failed"
    );
    describe_gauge!(
        "event_engine_info",
        "Engine version and build information"
    );

    gauge!("event_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

pub fn record_events_ingested(count: u64) {
    counter!("events_ingested_total").increment(count);
}

/// `stage` is `registry` or `source`
pub fn record_ingest_failure(stage: &str) {
    counter!("event_ingest_failures_total", "stage" => stage.to_string()).increment(1);
}

pub fn record_correlation_failure() {
    counter!("correlation_failures_total").increment(1);
}

pub fn record_query(duration: Duration, failed: bool) {
    histogram!("event_query_duration_seconds").record(duration.as_secs_f64());
    if failed {
        counter!("event_query_failures_total").increment(1);
    }
}

pub fn record_purge(deleted: u64, duration: Duration) {
    histogram!("event_purge_duration_seconds").record(duration.as_secs_f64());
    counter!("events_purged_total").increment(deleted);
}

pub fn record_stage(stage: &str, duration: Duration, failed: bool) {
    histogram!(
        "maintenance_stage_duration_seconds",
        "stage" => stage.to_string(),
    )
    .record(duration.as_secs_f64());
    if failed {
        counter!("maintenance_stage_failures_total", "stage" => stage.to_string()).increment(1);
    }
}
