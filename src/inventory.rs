//! Endpoint inventory seam: expands group scopes into endpoint ids.

use crate::authz::Principal;
use async_trait::async_trait;
use std::collections::HashMap;

/// An auto-group: all children of `parent_id` with endpoint type `type_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AutoGroup {
    pub parent_id: i64,
    pub type_id: i64,
}

#[async_trait]
pub trait EndpointInventory: Send + Sync {
    async fn endpoints_for_auto_group(
        &self,
        principal: &Principal,
        group: AutoGroup,
    ) -> anyhow::Result<Vec<i64>>;

    /// Members of a compatible group
    async fn endpoints_for_group(
        &self,
        principal: &Principal,
        group_id: i64,
    ) -> anyhow::Result<Vec<i64>>;
}

/// Fixed in-memory inventory.
#[derive(Debug, Default, Clone)]
pub struct StaticInventory {
    auto_groups: HashMap<AutoGroup, Vec<i64>>,
    groups: HashMap<i64, Vec<i64>>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_group(mut self, group: AutoGroup, members: Vec<i64>) -> Self {
        self.auto_groups.insert(group, members);
        self
    }

    pub fn with_group(mut self, group_id: i64, members: Vec<i64>) -> Self {
        self.groups.insert(group_id, members);
        self
    }
}

#[async_trait]
impl EndpointInventory for StaticInventory {
    async fn endpoints_for_auto_group(
        &self,
        _principal: &Principal,
        group: AutoGroup,
    ) -> anyhow::Result<Vec<i64>> {
        Ok(self.auto_groups.get(&group).cloned().unwrap_or_default())
    }

    async fn endpoints_for_group(
        &self,
        _principal: &Principal,
        group_id: i64,
    ) -> anyhow::Result<Vec<i64>> {
        Ok(self.groups.get(&group_id).cloned().unwrap_or_default())
    }
}
