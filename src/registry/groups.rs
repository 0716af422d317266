//! Group Registry
//!
//! Owns the `Group` entities, keyed by custody address. Creation is an
//! unconditional upsert; deletion removes the record. The registry is a
//! plain map because it always lives inside the service's single write
//! lock.

use std::collections::HashMap;

use crate::types::Group;

/// In-memory group store
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: HashMap<String, Group>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or wholesale-replace a group
    pub fn upsert(&mut self, group: Group) {
        self.groups.insert(group.custody_address.clone(), group);
    }

    /// Get a group by custody address
    pub fn get(&self, custody_address: &str) -> Option<&Group> {
        self.groups.get(custody_address)
    }

    /// Get a mutable group by custody address
    pub fn get_mut(&mut self, custody_address: &str) -> Option<&mut Group> {
        self.groups.get_mut(custody_address)
    }

    /// Remove a group; returns the removed record if it existed
    pub fn remove(&mut self, custody_address: &str) -> Option<Group> {
        self.groups.remove(custody_address)
    }

    /// All groups
    pub fn all(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Aggregate statistics
    pub fn stats(&self) -> GroupRegistryStats {
        GroupRegistryStats {
            total: self.groups.len() as u64,
            total_capacity_sats: self.groups.values().map(|g| g.capacity_sats).sum(),
            total_balance_sats: self.groups.values().map(|g| g.current_balance_sats).sum(),
        }
    }
}

/// Registry statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GroupRegistryStats {
    pub total: u64,
    pub total_capacity_sats: u64,
    pub total_balance_sats: u64,
}
