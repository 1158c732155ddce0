//! Per-branch module cost snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{BranchRole, ModuleCollection};

/// Ordered mapping from module name to cost for one branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSnapshot {
    costs: BTreeMap<String, f64>,
}

impl CostSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Project a collection into a snapshot. Unparsable modules are left out.
    pub fn from_collection(collection: &ModuleCollection) -> Self {
        let mut snapshot = Self::new();
        snapshot.extend_from(collection);
        snapshot
    }

    /// Record every parsed module of a collection; a repeated name keeps the latest cost.
    pub fn extend_from(&mut self, collection: &ModuleCollection) {
        for module in collection.parsed() {
            self.costs.insert(module.name.clone(), module.cost);
        }
    }

    /// Insert a single cost.
    pub fn insert(&mut self, name: impl Into<String>, cost: f64) {
        self.costs.insert(name.into(), cost);
    }

    /// Cost recorded for a module, if it existed on this branch.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.costs.get(name).copied()
    }

    /// Whether the module existed on this branch.
    pub fn contains(&self, name: &str) -> bool {
        self.costs.contains_key(name)
    }

    /// Iterate over module names and costs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, f64)> {
        self.costs.iter().map(|(name, cost)| (name, *cost))
    }

    /// Sum of all recorded costs.
    pub fn total(&self) -> f64 {
        self.costs.values().sum()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.costs.len()
    }

    /// Whether no modules were recorded.
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for CostSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            costs: iter
                .into_iter()
                .map(|(name, cost)| (name.into(), cost))
                .collect(),
        }
    }
}

/// The two snapshots of a comparison, selected by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotPair {
    base: CostSnapshot,
    feature: CostSnapshot,
}

impl SnapshotPair {
    /// Create an empty pair.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for a role.
    pub fn get(&self, role: BranchRole) -> &CostSnapshot {
        match role {
            BranchRole::Base => &self.base,
            BranchRole::Feature => &self.feature,
        }
    }

    /// Mutable snapshot for a role.
    pub fn get_mut(&mut self, role: BranchRole) -> &mut CostSnapshot {
        match role {
            BranchRole::Base => &mut self.base,
            BranchRole::Feature => &mut self.feature,
        }
    }

    /// Record a branch's analysis into the matching snapshot.
    pub fn record(&mut self, role: BranchRole, collection: &ModuleCollection) {
        self.get_mut(role).extend_from(collection);
    }

    /// Base snapshot.
    pub fn base(&self) -> &CostSnapshot {
        &self.base
    }

    /// Feature snapshot.
    pub fn feature(&self) -> &CostSnapshot {
        &self.feature
    }
}
