//! Event queries
//!
//! A query is built twice from the same [`EventFilter`]: once as a count
//! statement and once as a paged data statement. Both go through
//! [`push_filter`], so their bind lists are identical:
//!
//! 1. endpoint ids
//! 2. begin, end (inclusive)
//! 3. severities
//! 4. detail substring
//! 5. location substring
//!
//! The two statements are separate round trips; a concurrent write between
//! them can make the total disagree with the page.

use super::EventStore;
use crate::dialect::DialectAdapter;
use crate::error::{EventError, Result};
use crate::metrics;
use crate::model::{EventComposite, EventPoint, Page, PageControl, Severity};
use crate::sql::{like_pattern, SqlBuilder, Statement};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::time::Instant;

const DEFAULT_ORDER_BY: &str = "ev.timestamp DESC";

const COMPOSITE_COLUMNS: &str = "ev.detail, ev.id, evs.location, ev.severity, ev.timestamp, \
     evs.endpoint_id, en.name AS endpoint_name";

const EVENT_SOURCE_JOIN: &str = "FROM events ev JOIN event_sources evs ON evs.id = ev.event_source_id";

const ENDPOINT_JOIN: &str = "LEFT JOIN endpoints en ON en.id = evs.endpoint_id";

/// Filter state shared by the count and data statements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub endpoint_ids: Vec<i64>,
    /// Unix milliseconds, inclusive
    pub begin: i64,
    /// Unix milliseconds, inclusive
    pub end: i64,
    #[serde(default)]
    pub severities: Option<Vec<Severity>>,
    /// Case-insensitive substring of the source location
    #[serde(default)]
    pub source: Option<String>,
    /// Case-insensitive substring of the event detail
    #[serde(default)]
    pub detail: Option<String>,
}

impl EventFilter {
    pub fn new(endpoint_ids: Vec<i64>, begin: i64, end: i64) -> Self {
        Self {
            endpoint_ids,
            begin,
            end,
            ..Default::default()
        }
    }

    pub fn with_severities(mut self, severities: Vec<Severity>) -> Self {
        self.severities = Some(severities);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn active_severities(&self) -> Option<&[Severity]> {
        self.severities.as_deref().filter(|s| !s.is_empty())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Append the `WHERE` body for `filter`, binding in the fixed order.
pub fn push_filter(builder: &mut SqlBuilder<'_>, filter: &EventFilter) {
    let escape = builder.dialect().escape_char();
    let escape_clause = builder.dialect().escape_clause();
    let metacharacters = builder.dialect().like_metacharacters();

    builder
        .push("evs.endpoint_id IN (")
        .push_bind_list(filter.endpoint_ids.iter().copied())
        .push(") AND ev.timestamp BETWEEN ")
        .push_bind(filter.begin)
        .push(" AND ")
        .push_bind(filter.end);

    if let Some(severities) = filter.active_severities() {
        builder
            .push(" AND ev.severity IN (")
            .push_bind_list(severities.iter().map(|s| s.as_str()))
            .push(")");
    }

    if let Some(detail) = non_empty(&filter.detail) {
        builder
            .push(" AND UPPER(ev.detail) LIKE ")
            .push_bind(like_pattern(detail, escape, metacharacters))
            .push(&escape_clause);
    }

    if let Some(source) = non_empty(&filter.source) {
        builder
            .push(" AND UPPER(evs.location) LIKE ")
            .push_bind(like_pattern(source, escape, metacharacters))
            .push(&escape_clause);
    }
}

/// Count of matching events; no endpoint join, no paging
pub fn count_statement(dialect: &dyn DialectAdapter, filter: &EventFilter) -> Statement {
    let mut builder = SqlBuilder::new(dialect);
    builder
        .push("SELECT COUNT(ev.id) ")
        .push(EVENT_SOURCE_JOIN)
        .push(" WHERE ");
    push_filter(&mut builder, filter);
    builder.finish()
}

/// Paged rows of [`EventComposite`]
pub fn data_statement(
    dialect: &dyn DialectAdapter,
    filter: &EventFilter,
    page: &PageControl,
) -> Statement {
    let mut builder = SqlBuilder::new(dialect);
    builder
        .push("SELECT ")
        .push(COMPOSITE_COLUMNS)
        .push(" ")
        .push(EVENT_SOURCE_JOIN)
        .push(" ")
        .push(ENDPOINT_JOIN)
        .push(" WHERE ");
    push_filter(&mut builder, filter);
    let statement = builder.finish();

    Statement {
        sql: dialect.apply_paging(&statement.sql, &server_ordering(page), page),
        binds: statement.binds,
    }
}

/// Column expression for a server-sortable field
fn sortable_column(field: &str) -> Option<&'static str> {
    let field = field.rsplit('.').next().unwrap_or(field);
    match field.to_ascii_lowercase().as_str() {
        "timestamp" => Some("ev.timestamp"),
        "severity" => Some(
            "CASE ev.severity WHEN 'DEBUG' THEN 0 WHEN 'INFO' THEN 1 WHEN 'WARN' THEN 2 \
             WHEN 'ERROR' THEN 3 WHEN 'FATAL' THEN 4 END",
        ),
        "detail" => Some("ev.detail"),
        "location" => Some("evs.location"),
        "id" => Some("ev.id"),
        "endpoint_name" | "name" => Some("en.name"),
        _ => None,
    }
}

/// `ORDER BY` body for the data statement.
///
/// Fields without a server column are left to the caller's presentation
/// layer. With nothing left, events come newest first.
pub fn server_ordering(page: &PageControl) -> String {
    let parts: Vec<String> = page
        .ordering
        .iter()
        .filter_map(|o| {
            sortable_column(&o.field).map(|column| format!("{} {}", column, o.ordering.as_sql()))
        })
        .collect();

    if parts.is_empty() {
        DEFAULT_ORDER_BY.to_string()
    } else {
        parts.join(", ")
    }
}

fn severity_column(row: &SqliteRow, column: &str) -> Result<Severity> {
    let name: String = row.try_get(column)?;
    name.parse()
}

fn composite_from_row(row: &SqliteRow) -> Result<EventComposite> {
    Ok(EventComposite {
        detail: row.try_get("detail")?,
        event_id: row.try_get("id")?,
        location: row.try_get("location")?,
        severity: severity_column(row, "severity")?,
        timestamp: row.try_get("timestamp")?,
        endpoint_id: row.try_get("endpoint_id")?,
        endpoint_name: row.try_get("endpoint_name")?,
    })
}

impl EventStore {
    /// Run a filtered, paged event query.
    ///
    /// An empty endpoint list returns an empty page without touching the
    /// database. SQL failures are logged with the statement and the filter
    /// and degrade to an empty page.
    pub async fn find(&self, filter: &EventFilter, page: PageControl) -> Page<EventComposite> {
        if filter.endpoint_ids.is_empty() {
            return Page::empty(page);
        }

        let started = Instant::now();
        let count = count_statement(self.dialect(), filter);
        let data = data_statement(self.dialect(), filter, &page);

        match self.run_find(&count, &data).await {
            Ok((total_rows, rows)) => {
                metrics::record_query(started.elapsed(), false);
                tracing::debug!(
                    endpoints = filter.endpoint_ids.len(),
                    total_rows = total_rows,
                    returned = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Event query completed"
                );
                Page {
                    rows,
                    total_rows,
                    page_control: page,
                }
            }
            Err(e) => {
                metrics::record_query(started.elapsed(), true);
                tracing::error!(
                    error = %e,
                    sql = %data.sql,
                    endpoints = filter.endpoint_ids.len(),
                    begin = filter.begin,
                    end = filter.end,
                    severities = ?filter.severities,
                    detail = ?filter.detail,
                    source = ?filter.source,
                    page = %page,
                    "Event query failed, returning empty page"
                );
                Page::empty(page)
            }
        }
    }

    async fn run_find(
        &self,
        count: &Statement,
        data: &Statement,
    ) -> Result<(u64, Vec<EventComposite>)> {
        let total: i64 = count.query().fetch_one(&self.pool).await?.try_get(0)?;

        let rows = data
            .query()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(composite_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok((total.max(0) as u64, rows))
    }

    /// Timestamp and severity of every matching event, for bucketing.
    ///
    /// Follows the query failure policy: errors are logged and yield no points.
    pub async fn find_event_points(
        &self,
        endpoint_ids: &[i64],
        begin: i64,
        end: i64,
    ) -> Vec<EventPoint> {
        if endpoint_ids.is_empty() {
            return Vec::new();
        }

        let filter = EventFilter::new(endpoint_ids.to_vec(), begin, end);
        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("SELECT ev.timestamp, ev.severity ")
            .push(EVENT_SOURCE_JOIN)
            .push(" WHERE ");
        push_filter(&mut builder, &filter);
        let statement = builder.finish();

        let result = self.fetch_points(&statement).await;

        result.unwrap_or_else(|e| {
            tracing::error!(
                error = %e,
                sql = %statement.sql,
                endpoints = endpoint_ids.len(),
                begin = begin,
                end = end,
                "Event point query failed, returning no points"
            );
            Vec::new()
        })
    }

    async fn fetch_points(&self, statement: &Statement) -> Result<Vec<EventPoint>> {
        statement
            .query()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<EventPoint> {
                Ok(EventPoint {
                    timestamp: row.try_get("timestamp")?,
                    severity: severity_column(row, "severity")?,
                })
            })
            .collect()
    }

    /// A single event with its source location and endpoint name
    pub async fn get_event_detail(&self, event_id: i64) -> Result<EventComposite> {
        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("SELECT ")
            .push(COMPOSITE_COLUMNS)
            .push(" ")
            .push(EVENT_SOURCE_JOIN)
            .push(" ")
            .push(ENDPOINT_JOIN)
            .push(" WHERE ev.id = ")
            .push_bind(event_id);
        let statement = builder.finish();

        match statement.query().fetch_optional(&self.pool).await? {
            Some(row) => composite_from_row(&row),
            None => Err(EventError::NotFound(format!("event[id={}]", event_id))),
        }
    }

    /// Number of events per severity for one endpoint; absent severities count 0
    pub async fn event_counts_by_severity(
        &self,
        endpoint_id: i64,
        begin: i64,
        end: i64,
    ) -> Result<BTreeMap<Severity, u64>> {
        let filter = EventFilter::new(vec![endpoint_id], begin, end);
        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("SELECT ev.severity, COUNT(ev.id) AS occurrences ")
            .push(EVENT_SOURCE_JOIN)
            .push(" WHERE ");
        push_filter(&mut builder, &filter);
        builder.push(" GROUP BY ev.severity");
        let statement = builder.finish();

        let mut counts: BTreeMap<Severity, u64> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();

        for row in statement.query().fetch_all(&self.pool).await? {
            let severity = severity_column(&row, "severity")?;
            let occurrences: i64 = row.try_get("occurrences")?;
            counts.insert(severity, occurrences.max(0) as u64);
        }

        Ok(counts)
    }
}
