//! Event source registry
//!
//! Sources are created lazily the first time a `(definition, endpoint,
//! location)` tuple reports an event. The insert is guarded by `NOT EXISTS`
//! and selected from the one-row `single_row` table, so the same statement
//! works on every dialect without native upsert syntax.

use super::EventStore;
use crate::dialect::DialectAdapter;
use crate::error::Result;
use crate::model::EventSourceKey;
use crate::sql::{SqlBuilder, Statement};
use sqlx::Row;
use std::collections::BTreeSet;

/// Marker value stored in `single_row.i`
pub const SINGLE_ROW_MARKER: i64 = 42;

/// Insert for one source tuple, a no-op when the tuple already exists.
///
/// The definition id is looked up by definition name, endpoint type name and
/// namespace; an unknown definition inserts nothing.
pub fn source_insert(dialect: &dyn DialectAdapter, key: &EventSourceKey) -> Statement {
    let id_expression = dialect.next_id_expression("event_sources");

    let mut builder = SqlBuilder::new(dialect);
    builder.push("INSERT INTO event_sources (");
    if id_expression.is_some() {
        builder.push("id, ");
    }
    builder.push("event_def_id, endpoint_id, location) SELECT ");
    if let Some(expr) = &id_expression {
        builder.push(expr).push(", ");
    }
    builder
        .push("ed.id, ")
        .push_bind(key.endpoint_id)
        .push(", ")
        .push_bind(key.location.as_str())
        .push(" FROM single_row sr JOIN event_definitions ed ON ed.name = ")
        .push_bind(key.definition.as_str())
        .push(" JOIN endpoint_types et ON et.id = ed.endpoint_type_id AND et.name = ")
        .push_bind(key.endpoint_type.as_str())
        .push(" AND et.namespace = ")
        .push_bind(key.namespace.as_str())
        .push(&format!(" WHERE sr.i = {} AND NOT EXISTS (", SINGLE_ROW_MARKER))
        .push("SELECT 1 FROM event_sources es WHERE es.event_def_id = ed.id AND es.endpoint_id = ")
        .push_bind(key.endpoint_id)
        .push(" AND es.location = ")
        .push_bind(key.location.as_str())
        .push(")");
    builder.finish()
}

impl EventStore {
    /// Make sure every distinct source exists.
    ///
    /// All inserts run in one transaction; returns the number of sources
    /// created by this call.
    pub async fn ensure_sources<'a, I>(&self, sources: I) -> Result<u64>
    where
        I: IntoIterator<Item = &'a EventSourceKey>,
    {
        let distinct: BTreeSet<&EventSourceKey> = sources.into_iter().collect();
        if distinct.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut created = 0;

        for key in &distinct {
            let statement = source_insert(self.dialect(), key);
            created += match statement.query().execute(&mut *tx).await {
                Ok(result) => result.rows_affected(),
                // inserted concurrently by another writer
                Err(e) if super::is_unique_violation(&e) => 0,
                Err(e) => return Err(e.into()),
            };
        }

        tx.commit().await?;

        tracing::debug!(
            requested = distinct.len(),
            created = created,
            "Event sources ensured"
        );

        Ok(created)
    }

    /// Id of an existing source, if registered
    pub async fn find_source_id(&self, key: &EventSourceKey) -> Result<Option<i64>> {
        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("SELECT es.id FROM event_sources es ")
            .push(super::SOURCE_DEFINITION_JOIN)
            .push(" WHERE ");
        push_source_predicate(&mut builder, key);
        let statement = builder.finish();

        let id: Option<i64> = statement
            .query()
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.try_get(0))
            .transpose()?;

        Ok(id)
    }
}

/// `ed.name = ? AND et.name = ? AND et.namespace = ? AND es.endpoint_id = ? AND es.location = ?`
pub(crate) fn push_source_predicate(builder: &mut SqlBuilder<'_>, key: &EventSourceKey) {
    builder
        .push("ed.name = ")
        .push_bind(key.definition.as_str())
        .push(" AND et.name = ")
        .push_bind(key.endpoint_type.as_str())
        .push(" AND et.namespace = ")
        .push_bind(key.namespace.as_str())
        .push(" AND es.endpoint_id = ")
        .push_bind(key.endpoint_id)
        .push(" AND es.location = ")
        .push_bind(key.location.as_str());
}
