//! Scoped event operations
//!
//! [`EventService`] sits between callers and the [`EventStore`]: it expands
//! group scopes through the [`EndpointInventory`], asks the
//! [`AuthorizationGate`] about every endpoint in scope, and only then issues
//! SQL. A refusal is an error, never a silently filtered result.

use crate::authz::{AuthorizationGate, Principal};
use crate::buckets::{self, BucketGrid};
use crate::error::{EventError, Result};
use crate::inventory::{AutoGroup, EndpointInventory};
use crate::model::{EventComposite, Page, PageControl, Severity};
use crate::store::{EventFilter, EventStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Which endpoints a query covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Endpoint(i64),
    Endpoints(Vec<i64>),
    /// Children of `parent_id` with endpoint type `type_id`
    AutoGroup { parent_id: i64, type_id: i64 },
    Group(i64),
}

impl EventScope {
    pub fn auto_group(group: AutoGroup) -> Self {
        Self::AutoGroup {
            parent_id: group.parent_id,
            type_id: group.type_id,
        }
    }
}

/// Query criteria: a scope plus the filters of [`EventFilter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCriteria {
    pub scope: EventScope,
    pub begin: i64,
    pub end: i64,
    #[serde(default)]
    pub severities: Option<Vec<Severity>>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl EventCriteria {
    pub fn new(scope: EventScope, begin: i64, end: i64) -> Self {
        Self {
            scope,
            begin,
            end,
            severities: None,
            source: None,
            detail: None,
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

    fn into_filter(self, endpoint_ids: Vec<i64>) -> EventFilter {
        EventFilter {
            endpoint_ids,
            begin: self.begin,
            end: self.end,
            severities: self.severities,
            source: self.source,
            detail: self.detail,
        }
    }
}

#[derive(Clone)]
pub struct EventService {
    store: EventStore,
    authz: Arc<dyn AuthorizationGate>,
    inventory: Arc<dyn EndpointInventory>,
}

impl EventService {
    pub fn new(
        store: EventStore,
        authz: Arc<dyn AuthorizationGate>,
        inventory: Arc<dyn EndpointInventory>,
    ) -> Self {
        Self {
            store,
            authz,
            inventory,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Expand a scope to endpoint ids, failing if any of them is not visible
    pub async fn resolve_scope(&self, principal: &Principal, scope: &EventScope) -> Result<Vec<i64>> {
        let endpoint_ids = match scope {
            EventScope::Endpoint(id) => vec![*id],
            EventScope::Endpoints(ids) => ids.clone(),
            EventScope::AutoGroup { parent_id, type_id } => {
                let group = AutoGroup {
                    parent_id: *parent_id,
                    type_id: *type_id,
                };
                self.inventory
                    .endpoints_for_auto_group(principal, group)
                    .await
                    .map_err(|e| {
                        EventError::Inventory(format!(
                            "auto-group[parent={}, type={}]: {}",
                            parent_id, type_id, e
                        ))
                    })?
            }
            EventScope::Group(group_id) => {
                if !self.authz.can_view_group(principal, *group_id).await {
                    tracing::warn!(principal = %principal, group_id = group_id, "Group access denied");
                    return Err(EventError::Permission(format!(
                        "user [{}] cannot view group[id={}]",
                        principal, group_id
                    )));
                }
                self.inventory
                    .endpoints_for_group(principal, *group_id)
                    .await
                    .map_err(|e| EventError::Inventory(format!("group[id={}]: {}", group_id, e)))?
            }
        };

        for endpoint_id in &endpoint_ids {
            self.check_endpoint(principal, *endpoint_id).await?;
        }

        Ok(endpoint_ids)
    }

    async fn check_endpoint(&self, principal: &Principal, endpoint_id: i64) -> Result<()> {
        if self.authz.can_view_endpoint(principal, endpoint_id).await {
            Ok(())
        } else {
            tracing::warn!(
                principal = %principal,
                endpoint_id = endpoint_id,
                "Endpoint access denied"
            );
            Err(EventError::Permission(format!(
                "user [{}] cannot view endpoint[id={}]",
                principal, endpoint_id
            )))
        }
    }

    /// Filtered, paged events for a scope.
    ///
    /// Only authorization and inventory faults are errors; SQL faults degrade
    /// to an empty page inside the store.
    pub async fn find_events(
        &self,
        principal: &Principal,
        criteria: EventCriteria,
        page: PageControl,
    ) -> Result<Page<EventComposite>> {
        let endpoint_ids = self.resolve_scope(principal, &criteria.scope).await?;
        let filter = criteria.into_filter(endpoint_ids);
        Ok(self.store.find(&filter, page).await)
    }

    pub async fn find_events_for_endpoint(
        &self,
        principal: &Principal,
        endpoint_id: i64,
        begin: i64,
        end: i64,
        page: PageControl,
    ) -> Result<Page<EventComposite>> {
        let criteria = EventCriteria::new(EventScope::Endpoint(endpoint_id), begin, end);
        self.find_events(principal, criteria, page).await
    }

    pub async fn find_events_for_auto_group(
        &self,
        principal: &Principal,
        group: AutoGroup,
        begin: i64,
        end: i64,
        page: PageControl,
    ) -> Result<Page<EventComposite>> {
        let criteria = EventCriteria::new(EventScope::auto_group(group), begin, end);
        self.find_events(principal, criteria, page).await
    }

    pub async fn find_events_for_group(
        &self,
        principal: &Principal,
        group_id: i64,
        begin: i64,
        end: i64,
        page: PageControl,
    ) -> Result<Page<EventComposite>> {
        let criteria = EventCriteria::new(EventScope::Group(group_id), begin, end);
        self.find_events(principal, criteria, page).await
    }

    /// Event occurrences per bucket for one endpoint
    pub async fn event_counts(
        &self,
        principal: &Principal,
        endpoint_id: i64,
        begin: i64,
        end: i64,
        num_buckets: usize,
    ) -> Result<Vec<u64>> {
        let grid = BucketGrid::new(begin, end, num_buckets)?;
        self.check_endpoint(principal, endpoint_id).await?;

        let points = self.store.find_event_points(&[endpoint_id], begin, end).await;
        Ok(buckets::count_buckets(&points, &grid))
    }

    /// Most severe event per bucket over a scope
    pub async fn severity_buckets(
        &self,
        principal: &Principal,
        scope: &EventScope,
        begin: i64,
        end: i64,
        num_buckets: usize,
    ) -> Result<Vec<Option<Severity>>> {
        let grid = BucketGrid::new(begin, end, num_buckets)?;
        let endpoint_ids = self.resolve_scope(principal, scope).await?;

        let points = self.store.find_event_points(&endpoint_ids, begin, end).await;
        Ok(buckets::severity_buckets(&points, &grid))
    }

    pub async fn severity_buckets_for_endpoint(
        &self,
        principal: &Principal,
        endpoint_id: i64,
        begin: i64,
        end: i64,
        num_buckets: usize,
    ) -> Result<Vec<Option<Severity>>> {
        self.severity_buckets(principal, &EventScope::Endpoint(endpoint_id), begin, end, num_buckets)
            .await
    }

    pub async fn severity_buckets_for_auto_group(
        &self,
        principal: &Principal,
        group: AutoGroup,
        begin: i64,
        end: i64,
        num_buckets: usize,
    ) -> Result<Vec<Option<Severity>>> {
        self.severity_buckets(principal, &EventScope::auto_group(group), begin, end, num_buckets)
            .await
    }

    pub async fn severity_buckets_for_group(
        &self,
        principal: &Principal,
        group_id: i64,
        begin: i64,
        end: i64,
        num_buckets: usize,
    ) -> Result<Vec<Option<Severity>>> {
        self.severity_buckets(principal, &EventScope::Group(group_id), begin, end, num_buckets)
            .await
    }

    /// Event detail, visible only if its endpoint is
    pub async fn get_event_detail(&self, principal: &Principal, event_id: i64) -> Result<EventComposite> {
        let detail = self.store.get_event_detail(event_id).await?;
        self.check_endpoint(principal, detail.endpoint_id).await?;
        Ok(detail)
    }

    pub async fn event_counts_by_severity(
        &self,
        principal: &Principal,
        endpoint_id: i64,
        begin: i64,
        end: i64,
    ) -> Result<BTreeMap<Severity, u64>> {
        self.check_endpoint(principal, endpoint_id).await?;
        self.store.event_counts_by_severity(endpoint_id, begin, end).await
    }

    pub async fn delete_all_events_for_endpoint(
        &self,
        principal: &Principal,
        endpoint_id: i64,
    ) -> Result<u64> {
        self.check_endpoint(principal, endpoint_id).await?;
        self.store.delete_all_events_for_endpoint(endpoint_id).await
    }

    pub async fn delete_all_events_for_group(&self, principal: &Principal, group_id: i64) -> Result<u64> {
        let endpoint_ids = self.resolve_scope(principal, &EventScope::Group(group_id)).await?;
        self.store.delete_all_events_for_endpoints(&endpoint_ids).await
    }
}
