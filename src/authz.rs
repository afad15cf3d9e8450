//! Authorization gate seam
//!
//! The engine never decides visibility itself. Scoped queries ask an
//! [`AuthorizationGate`] first and turn a refusal into
//! [`EventError::Permission`](crate::error::EventError::Permission).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The caller on whose behalf a query runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub name: String,
}

impl Principal {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    async fn can_view_endpoint(&self, principal: &Principal, endpoint_id: i64) -> bool;

    async fn can_view_group(&self, principal: &Principal, group_id: i64) -> bool;
}

/// Gate that allows everything, for operator tooling running with full rights.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl AuthorizationGate for AllowAll {
    async fn can_view_endpoint(&self, _principal: &Principal, _endpoint_id: i64) -> bool {
        true
    }

    async fn can_view_group(&self, _principal: &Principal, _group_id: i64) -> bool {
        true
    }
}

/// In-memory grant table keyed by principal id.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthorization {
    endpoints: HashMap<i64, HashSet<i64>>,
    groups: HashMap<i64, HashSet<i64>>,
}

impl StaticAuthorization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_endpoint(mut self, principal_id: i64, endpoint_id: i64) -> Self {
        self.endpoints
            .entry(principal_id)
            .or_default()
            .insert(endpoint_id);
        self
    }

    pub fn grant_group(mut self, principal_id: i64, group_id: i64) -> Self {
        self.groups.entry(principal_id).or_default().insert(group_id);
        self
    }
}

#[async_trait]
impl AuthorizationGate for StaticAuthorization {
    async fn can_view_endpoint(&self, principal: &Principal, endpoint_id: i64) -> bool {
        self.endpoints
            .get(&principal.id)
            .is_some_and(|ids| ids.contains(&endpoint_id))
    }

    async fn can_view_group(&self, principal: &Principal, group_id: i64) -> bool {
        self.groups
            .get(&principal.id)
            .is_some_and(|ids| ids.contains(&group_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_grants() {
        let alice = Principal::new(1, "alice");
        let bob = Principal::new(2, "bob");
        let gate = StaticAuthorization::new()
            .grant_endpoint(1, 42)
            .grant_group(1, 7);

        assert!(gate.can_view_endpoint(&alice, 42).await);
        assert!(!gate.can_view_endpoint(&alice, 99).await);
        assert!(gate.can_view_group(&alice, 7).await);
        assert!(!gate.can_view_endpoint(&bob, 42).await);
        assert!(!gate.can_view_group(&bob, 7).await);
    }

    #[tokio::test]
    async fn test_allow_all() {
        let anyone = Principal::new(0, "operator");
        assert!(AllowAll.can_view_endpoint(&anyone, 12345).await);
        assert!(AllowAll.can_view_group(&anyone, 1).await);
    }
}
