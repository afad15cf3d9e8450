//! Endpoint type, event definition and endpoint metadata
//!
//! Ingestion never creates these rows; it only resolves them by name. Every
//! registration is idempotent and uses the same `NOT EXISTS` guarded insert
//! as the source registry.

use super::registry::SINGLE_ROW_MARKER;
use super::EventStore;
use crate::error::{EventError, Result};
use crate::sql::SqlBuilder;
use sqlx::Row;

impl EventStore {
    /// Register an endpoint type and return its id
    pub async fn register_endpoint_type(&self, name: &str, namespace: &str) -> Result<i64> {
        let mut builder = SqlBuilder::new(self.dialect());
        builder.push("INSERT INTO endpoint_types (");
        let id_expression = self.dialect().next_id_expression("endpoint_types");
        if id_expression.is_some() {
            builder.push("id, ");
        }
        builder.push("name, namespace) SELECT ");
        if let Some(expr) = &id_expression {
            builder.push(expr).push(", ");
        }
        builder
            .push_bind(name)
            .push(", ")
            .push_bind(namespace)
            .push(&format!(
                " FROM single_row sr WHERE sr.i = {} AND NOT EXISTS (SELECT 1 FROM endpoint_types et WHERE et.name = ",
                SINGLE_ROW_MARKER
            ))
            .push_bind(name)
            .push(" AND et.namespace = ")
            .push_bind(namespace)
            .push(")");
        builder.finish().query().execute(&self.pool).await?;

        self.find_endpoint_type(name, namespace)
            .await?
            .ok_or_else(|| EventError::NotFound(format!("endpoint type {}/{}", namespace, name)))
    }

    pub async fn find_endpoint_type(&self, name: &str, namespace: &str) -> Result<Option<i64>> {
        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("SELECT id FROM endpoint_types WHERE name = ")
            .push_bind(name)
            .push(" AND namespace = ")
            .push_bind(namespace);
        let statement = builder.finish();

        let id: Option<i64> = statement
            .query()
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.try_get(0))
            .transpose()?;
        Ok(id)
    }

    /// Register an event definition (and its endpoint type) and return its id
    pub async fn register_event_definition(
        &self,
        definition: &str,
        endpoint_type: &str,
        namespace: &str,
    ) -> Result<i64> {
        let type_id = self.register_endpoint_type(endpoint_type, namespace).await?;

        let mut builder = SqlBuilder::new(self.dialect());
        builder.push("INSERT INTO event_definitions (");
        let id_expression = self.dialect().next_id_expression("event_definitions");
        if id_expression.is_some() {
            builder.push("id, ");
        }
        builder.push("name, endpoint_type_id) SELECT ");
        if let Some(expr) = &id_expression {
            builder.push(expr).push(", ");
        }
        builder
            .push_bind(definition)
            .push(", ")
            .push_bind(type_id)
            .push(&format!(
                " FROM single_row sr WHERE sr.i = {} AND NOT EXISTS (SELECT 1 FROM event_definitions ed WHERE ed.name = ",
                SINGLE_ROW_MARKER
            ))
            .push_bind(definition)
            .push(" AND ed.endpoint_type_id = ")
            .push_bind(type_id)
            .push(")");
        builder.finish().query().execute(&self.pool).await?;

        let mut lookup = SqlBuilder::new(self.dialect());
        lookup
            .push("SELECT id FROM event_definitions WHERE name = ")
            .push_bind(definition)
            .push(" AND endpoint_type_id = ")
            .push_bind(type_id);
        let id: i64 = lookup
            .finish()
            .query()
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        tracing::debug!(
            definition = definition,
            endpoint_type = endpoint_type,
            namespace = namespace,
            id = id,
            "Event definition registered"
        );
        Ok(id)
    }

    /// Register an endpoint or update its display name
    pub async fn register_endpoint(
        &self,
        endpoint_id: i64,
        name: &str,
        endpoint_type: &str,
        namespace: &str,
    ) -> Result<()> {
        let type_id = self.register_endpoint_type(endpoint_type, namespace).await?;

        let mut insert = SqlBuilder::new(self.dialect());
        insert
            .push("INSERT INTO endpoints (id, name, endpoint_type_id) SELECT ")
            .push_bind(endpoint_id)
            .push(", ")
            .push_bind(name)
            .push(", ")
            .push_bind(type_id)
            .push(&format!(
                " FROM single_row sr WHERE sr.i = {} AND NOT EXISTS (SELECT 1 FROM endpoints en WHERE en.id = ",
                SINGLE_ROW_MARKER
            ))
            .push_bind(endpoint_id)
            .push(")");
        let insert = insert.finish();

        let mut rename = SqlBuilder::new(self.dialect());
        rename
            .push("UPDATE endpoints SET name = ")
            .push_bind(name)
            .push(" WHERE id = ")
            .push_bind(endpoint_id);
        let rename = rename.finish();

        let mut tx = self.pool.begin().await?;
        insert.query().execute(&mut *tx).await?;
        rename.query().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Number of event definitions declared by an endpoint type
    pub async fn event_definition_count_for_endpoint_type(&self, type_id: i64) -> Result<i64> {
        let mut builder = SqlBuilder::new(self.dialect());
        builder
            .push("SELECT COUNT(ed.id) FROM event_definitions ed WHERE ed.endpoint_type_id = ")
            .push_bind(type_id);

        let count: i64 = builder
            .finish()
            .query()
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(count)
    }
}
