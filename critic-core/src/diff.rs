//! Snapshot comparison: regressed modules and the aggregate score delta.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::round2;
use crate::snapshot::CostSnapshot;

/// Result of comparing a base and a feature snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    /// Modules in both snapshots whose feature cost is strictly higher.
    pub regressed: BTreeSet<String>,
    /// Modules only present on the feature branch.
    pub new_modules: BTreeSet<String>,
    /// Modules only present on the base branch.
    pub removed_modules: BTreeSet<String>,
    /// Sum of base costs.
    pub base_total: f64,
    /// Sum of feature costs.
    pub feature_total: f64,
    /// Absolute difference between the totals.
    pub delta: f64,
}

impl RegressionResult {
    /// Whether the feature total exceeds the base total.
    pub fn is_degraded(&self) -> bool {
        self.feature_total > self.base_total
    }

    /// Number of regressed modules.
    pub fn regressed_count(&self) -> usize {
        self.regressed.len()
    }

    /// Delta rounded for display.
    pub fn rounded_delta(&self) -> f64 {
        round2(self.delta)
    }
}

/// Compare two snapshots.
///
/// A module regresses only when it exists on both branches and its cost
/// strictly increased. Added and removed modules are counted separately and
/// never regress.
pub fn diff(base: &CostSnapshot, feature: &CostSnapshot) -> RegressionResult {
    let mut regressed = BTreeSet::new();
    let mut new_modules = BTreeSet::new();

    for (name, feature_cost) in feature.iter() {
        match base.get(name) {
            Some(base_cost) if feature_cost > base_cost => {
                regressed.insert(name.clone());
            }
            Some(_) => {}
            None => {
                new_modules.insert(name.clone());
            }
        }
    }

    let removed_modules = base
        .iter()
        .filter(|(name, _)| !feature.contains(name))
        .map(|(name, _)| name.clone())
        .collect();

    let base_total = base.total();
    let feature_total = feature.total();

    RegressionResult {
        regressed,
        new_modules,
        removed_modules,
        base_total,
        feature_total,
        delta: (feature_total - base_total).abs(),
    }
}
