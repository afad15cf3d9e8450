/// Integration tests for the write path, the query path and the bucketizer
use event_engine::{
    authz::{Principal, StaticAuthorization},
    config::DatabaseConfig,
    correlation::ChannelNotifier,
    ingest::{IngestQueue, IngestReport},
    inventory::{AutoGroup, StaticInventory},
    model::{EventPoint, PageOrdering},
    EventBatch, EventError, EventFilter, EventRecord, EventScope, EventService, EventSourceKey,
    EventStore, PageControl, Severity,
};
use std::sync::Arc;
use std::time::Duration;

const DEFINITION: &str = "fileChanged";
const ENDPOINT_TYPE: &str = "Linux";
const NAMESPACE: &str = "platform";

async fn catalog(store: &EventStore) {
    store
        .register_event_definition(DEFINITION, ENDPOINT_TYPE, NAMESPACE)
        .await
        .unwrap();
    store
        .register_endpoint(42, "web-01", ENDPOINT_TYPE, NAMESPACE)
        .await
        .unwrap();
    store
        .register_endpoint(43, "web-02", ENDPOINT_TYPE, NAMESPACE)
        .await
        .unwrap();
}

async fn memory_store() -> EventStore {
    let store = EventStore::open("sqlite::memory:").await.unwrap();
    catalog(&store).await;
    store
}

fn source(endpoint_id: i64, location: &str) -> EventSourceKey {
    EventSourceKey::new(DEFINITION, ENDPOINT_TYPE, NAMESPACE, endpoint_id, location)
}

fn batch_of(entries: Vec<(EventSourceKey, Vec<EventRecord>)>) -> EventBatch {
    let mut batch = EventBatch::new();
    for (key, records) in entries {
        batch.entry(key).or_default().extend(records);
    }
    batch
}

fn service(store: EventStore) -> EventService {
    let authz = StaticAuthorization::new()
        .grant_endpoint(1, 42)
        .grant_endpoint(1, 43)
        .grant_group(1, 7)
        .grant_group(1, 8);
    let inventory = StaticInventory::new()
        .with_group(7, vec![42, 43])
        .with_group(8, vec![42, 99])
        .with_auto_group(
            AutoGroup {
                parent_id: 10,
                type_id: 3,
            },
            vec![42, 99],
        );
    EventService::new(store, Arc::new(authz), Arc::new(inventory))
}

fn alice() -> Principal {
    Principal::new(1, "alice")
}

#[tokio::test]
async fn test_end_to_end_write_find_and_buckets() {
    let store = memory_store().await;
    let key = source(42, "/var/log/app.log");
    let batch = batch_of(vec![(
        key.clone(),
        vec![
            EventRecord::new(1000, Severity::Info, "app started"),
            EventRecord::new(2000, Severity::Error, "app crashed"),
            EventRecord::new(3000, Severity::Info, "app restarted"),
        ],
    )]);

    let summary = store.write(&batch).await;
    assert!(summary.is_complete());
    assert_eq!(summary.events_written, 3);

    let service = service(store);
    let page = service
        .find_events(
            &alice(),
            event_engine::EventCriteria::new(EventScope::Endpoint(42), 0, 4000),
            PageControl::new(0, 10),
        )
        .await
        .unwrap();

    assert_eq!(page.total_rows, 3);
    let timestamps: Vec<i64> = page.rows.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![3000, 2000, 1000]);
    assert_eq!(page.rows[0].location, "/var/log/app.log");
    assert_eq!(page.rows[0].endpoint_name.as_deref(), Some("web-01"));

    let buckets = service
        .severity_buckets_for_endpoint(&alice(), 42, 0, 4000, 4)
        .await
        .unwrap();
    assert_eq!(
        buckets,
        vec![None, Some(Severity::Info), Some(Severity::Error), Some(Severity::Info)]
    );

    let counts = service.event_counts(&alice(), 42, 0, 4000, 4).await.unwrap();
    assert_eq!(counts, vec![0, 1, 1, 1]);
}

#[tokio::test]
async fn test_count_buckets_sum_to_events_in_window() {
    let store = memory_store().await;
    let records: Vec<EventRecord> = (0..50)
        .map(|i| EventRecord::new(i * 137, Severity::Warn, format!("tick {}", i)))
        .collect();
    store.write(&batch_of(vec![(source(42, ""), records)])).await;

    let (begin, end) = (500, 5000);
    let expected = (0..50).map(|i| i * 137).filter(|ts| *ts >= begin && *ts < end).count() as u64;

    let counts = service(store)
        .event_counts(&alice(), 42, begin, end, 7)
        .await
        .unwrap();
    assert_eq!(counts.len(), 7);
    assert_eq!(counts.iter().sum::<u64>(), expected);
}

#[tokio::test]
async fn test_buckets_over_extreme_ranges() {
    let store = memory_store().await;
    store
        .write(&batch_of(vec![(
            source(42, ""),
            vec![
                EventRecord::new(-1000, Severity::Error, "before epoch"),
                EventRecord::new(1000, Severity::Info, "after epoch"),
            ],
        )]))
        .await;
    let service = service(store);

    let counts = service
        .event_counts(&alice(), 42, i64::MIN, 0, 4)
        .await
        .unwrap();
    assert_eq!(counts, vec![0, 0, 0, 1]);

    let severities = service
        .severity_buckets_for_endpoint(&alice(), 42, -1, i64::MAX, 4)
        .await
        .unwrap();
    assert_eq!(severities, vec![Some(Severity::Info), None, None, None]);

    assert!(matches!(
        service.event_counts(&alice(), 42, i64::MIN, i64::MAX, 1).await,
        Err(EventError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_count_matches_rows_when_limit_covers_total() {
    let store = memory_store().await;
    store
        .write(&batch_of(vec![
            (
                source(42, "/var/log/messages"),
                vec![
                    EventRecord::new(100, Severity::Warn, "Disk 91% full"),
                    EventRecord::new(200, Severity::Error, "disk failure"),
                    EventRecord::new(300, Severity::Info, "rotated"),
                ],
            ),
            (
                source(43, "/var/log/syslog"),
                vec![EventRecord::new(150, Severity::Error, "DISK unreadable")],
            ),
        ]))
        .await;

    let filter = EventFilter::new(vec![42, 43], 0, 1000)
        .with_severities(vec![Severity::Warn, Severity::Error])
        .with_detail("disk");
    let page = store
        .find(
            &filter,
            PageControl::new(0, 100).order_by("timestamp", PageOrdering::Asc),
        )
        .await;

    assert_eq!(page.total_rows, 3);
    assert_eq!(page.rows.len() as u64, page.total_rows);
    let timestamps: Vec<i64> = page.rows.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![100, 150, 200]);

    let by_source = store
        .find(&filter.clone().with_source("SYSLOG"), PageControl::unlimited())
        .await;
    assert_eq!(by_source.total_rows, 1);
    assert_eq!(by_source.rows[0].endpoint_id, 43);
}

#[tokio::test]
async fn test_empty_endpoint_list_returns_empty_page_without_sql() {
    let store = memory_store().await;
    // a closed pool would turn any SQL into an error
    store.close().await;

    let page = store
        .find(&EventFilter::new(Vec::new(), 0, i64::MAX), PageControl::new(0, 10))
        .await;
    assert!(page.rows.is_empty());
    assert_eq!(page.total_rows, 0);

    let points: Vec<EventPoint> = store.find_event_points(&[], 0, i64::MAX).await;
    assert!(points.is_empty());
}

#[tokio::test]
async fn test_notifier_receives_each_written_source_once() {
    let (notifier, mut rx) = ChannelNotifier::new();
    let store = memory_store().await.with_notifier(Arc::new(notifier));

    let summary = store
        .write(&batch_of(vec![
            (
                source(42, "/var/log/a.log"),
                vec![
                    EventRecord::new(1, Severity::Info, "a1"),
                    EventRecord::new(2, Severity::Info, "a2"),
                ],
            ),
            (
                source(43, "/var/log/b.log"),
                vec![EventRecord::new(3, Severity::Fatal, "b1")],
            ),
        ]))
        .await;
    assert_eq!(summary.sources, 2);
    assert_eq!(summary.events_written, 3);

    let mut seen = Vec::new();
    while let Ok(batch) = rx.try_recv() {
        seen.push((batch.source.endpoint_id, batch.events.len()));
    }
    seen.sort();
    assert_eq!(seen, vec![(42, 2), (43, 1)]);
}

#[tokio::test]
async fn test_unknown_definition_does_not_block_other_sources() {
    let store = memory_store().await;
    let unknown = EventSourceKey::new("neverDeclared", ENDPOINT_TYPE, NAMESPACE, 42, "");

    let summary = store
        .write(&batch_of(vec![
            (unknown, vec![EventRecord::new(1, Severity::Info, "lost")]),
            (source(43, ""), vec![EventRecord::new(2, Severity::Info, "kept")]),
        ]))
        .await;

    assert_eq!(summary.failed_sources, 1);
    assert_eq!(summary.events_written, 1);
    assert!(!summary.is_complete());
}

#[tokio::test]
async fn test_permission_denied_for_group_with_hidden_endpoint() {
    let store = memory_store().await;
    store.close().await;
    let service = service(store);

    let by_group = service
        .find_events_for_group(&alice(), 8, 0, 4000, PageControl::new(0, 10))
        .await;
    assert!(matches!(by_group, Err(EventError::Permission(msg)) if msg.contains("99")));

    let auto_group = AutoGroup {
        parent_id: 10,
        type_id: 3,
    };
    let by_auto_group = service
        .severity_buckets_for_auto_group(&alice(), auto_group, 0, 4000, 4)
        .await;
    assert!(matches!(by_auto_group, Err(EventError::Permission(_))));

    let bob = Principal::new(2, "bob");
    let denied_group = service.severity_buckets_for_group(&bob, 7, 0, 4000, 4).await;
    assert!(matches!(denied_group, Err(EventError::Permission(msg)) if msg.contains("group")));
}

#[tokio::test]
async fn test_group_scope_reads_all_member_endpoints() {
    let store = memory_store().await;
    store
        .write(&batch_of(vec![
            (source(42, ""), vec![EventRecord::new(10, Severity::Info, "one")]),
            (source(43, ""), vec![EventRecord::new(20, Severity::Warn, "two")]),
        ]))
        .await;
    let service = service(store);

    let page = service
        .find_events_for_group(&alice(), 7, 0, 100, PageControl::unlimited())
        .await
        .unwrap();
    assert_eq!(page.total_rows, 2);

    let deleted = service.delete_all_events_for_group(&alice(), 7).await.unwrap();
    assert_eq!(deleted, 2);
}

#[tokio::test]
async fn test_purge_keeps_events_at_or_after_cutoff() {
    let store = memory_store().await;
    store
        .write(&batch_of(vec![(
            source(42, "/var/log/app.log"),
            vec![
                EventRecord::new(1000, Severity::Info, "old"),
                EventRecord::new(5000, Severity::Info, "older than cutoff"),
                EventRecord::new(9000, Severity::Info, "recent"),
            ],
        )]))
        .await;

    let deleted = store.purge(6000, Duration::from_secs(60)).await.unwrap();
    assert_eq!(deleted, 2);

    let page = store
        .find(&EventFilter::new(vec![42], 0, 10_000), PageControl::unlimited())
        .await;
    assert_eq!(page.total_rows, 1);
    assert_eq!(page.rows[0].timestamp, 9000);
}

#[tokio::test]
async fn test_purge_on_closed_store_propagates_error() {
    let store = memory_store().await;
    store.close().await;

    let result = store.purge(6000, Duration::from_secs(60)).await;
    assert!(matches!(result, Err(EventError::Database(_))));
}

#[tokio::test]
async fn test_concurrent_ensure_sources_creates_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("events.db").display());
    let store = EventStore::connect(&DatabaseConfig::with_url(url))
        .await
        .unwrap();
    catalog(&store).await;

    let key = source(42, "/var/log/app.log");
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move { store.ensure_sources([&key]).await }));
    }

    let mut created = 0;
    for task in tasks {
        created += task.await.unwrap().unwrap();
    }
    assert_eq!(created, 1);

    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_sources")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
    assert!(store.find_source_id(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_ingest_queue_flushes_reports_into_store() {
    let store = memory_store().await;
    let (queue, task) = IngestQueue::spawn(store.clone(), 10, Duration::from_secs(60));

    assert!(queue.submit(IngestReport::new(
        source(42, ""),
        vec![EventRecord::new(1, Severity::Info, "queued")],
    )));
    assert!(queue.submit(IngestReport::new(
        source(42, ""),
        vec![
            EventRecord::new(1, Severity::Info, "queued"),
            EventRecord::new(2, Severity::Debug, "second"),
        ],
    )));

    let summary = queue.flush().await.unwrap();
    assert_eq!(summary.sources, 1);
    assert_eq!(summary.events_written, 2);

    drop(queue);
    task.await.unwrap();

    let counts = store.event_counts_by_severity(42, 0, 10).await.unwrap();
    assert_eq!(counts[&Severity::Info], 1);
    assert_eq!(counts[&Severity::Debug], 1);
    assert_eq!(counts[&Severity::Fatal], 0);
}
