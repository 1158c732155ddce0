//! Domain entities for Critic.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Cost recorded for a module that could not be analysed.
pub const UNPARSABLE_COST: f64 = 0.0;

/// Highest collection score.
pub const MAX_SCORE: f64 = 100.0;

/// Average module cost at which the collection score bottoms out.
pub const COST_LIMIT: f64 = 32.0;

/// Which side of a comparison a value belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchRole {
    /// The branch being merged into.
    Base,
    /// The branch under review.
    Feature,
}

impl BranchRole {
    /// Human-readable role label.
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchRole::Base => "base",
            BranchRole::Feature => "feature",
        }
    }
}

impl fmt::Display for BranchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A code smell detected in a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Smell {
    /// Stable identifier for the smell type.
    pub id: String,
    /// Human-readable summary of the issue.
    pub message: String,
    /// Cost contributed to the owning module.
    pub cost: f64,
}

/// Whether a module could be analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ModuleStatus {
    /// Metrics were computed.
    Parsed,
    /// The module could not be read or parsed.
    Unparsable(String),
}

/// Letter rating derived from a module cost.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rating {
    /// Cost up to 2.
    A,
    /// Cost up to 4.
    B,
    /// Cost up to 8.
    C,
    /// Cost up to 16.
    D,
    /// Cost up to 32.
    E,
    /// Anything above.
    F,
}

impl Rating {
    /// Rating for a module cost.
    pub fn from_cost(cost: f64) -> Self {
        if cost <= 2.0 {
            Rating::A
        } else if cost <= 4.0 {
            Rating::B
        } else if cost <= 8.0 {
            Rating::C
        } else if cost <= 16.0 {
            Rating::D
        } else if cost <= 32.0 {
            Rating::E
        } else {
            Rating::F
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Analysis result for one module on one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysedModule {
    /// Stable module name used as the comparison key.
    pub name: String,
    /// Source path of the module.
    pub path: PathBuf,
    /// Aggregate cost; higher means more problems.
    pub cost: f64,
    /// Decision-point complexity.
    pub complexity: f64,
    /// Duplicated code mass.
    pub duplication: f64,
    /// Number of revisions touching the module.
    pub churn: u32,
    /// Number of function definitions.
    pub methods_count: usize,
    /// Smells in detection order.
    pub smells: Vec<Smell>,
    /// Parse status.
    pub status: ModuleStatus,
}

impl AnalysedModule {
    /// Record a module that failed to parse.
    pub fn unparsable(name: String, path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            name,
            path,
            cost: UNPARSABLE_COST,
            complexity: 0.0,
            duplication: 0.0,
            churn: 0,
            methods_count: 0,
            smells: Vec::new(),
            status: ModuleStatus::Unparsable(reason.into()),
        }
    }

    /// Whether metrics were computed for this module.
    pub fn is_parsed(&self) -> bool {
        self.status == ModuleStatus::Parsed
    }

    /// Letter rating for this module.
    pub fn rating(&self) -> Rating {
        Rating::from_cost(self.cost)
    }
}

/// Full analysis result for one branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleCollection {
    /// Paths the analysis was asked to cover.
    pub requested: Vec<PathBuf>,
    /// Modules in analysis order.
    pub modules: Vec<AnalysedModule>,
    /// Requested paths that did not exist.
    pub missing: Vec<PathBuf>,
}

impl ModuleCollection {
    /// Create a collection from requested paths and analysed modules.
    pub fn new(requested: Vec<PathBuf>, modules: Vec<AnalysedModule>) -> Self {
        Self {
            requested,
            modules,
            missing: Vec::new(),
        }
    }

    /// Modules that were analysed successfully.
    pub fn parsed(&self) -> impl Iterator<Item = &AnalysedModule> {
        self.modules.iter().filter(|module| module.is_parsed())
    }

    /// Modules that could not be analysed.
    pub fn unparsable(&self) -> impl Iterator<Item = &AnalysedModule> {
        self.modules.iter().filter(|module| !module.is_parsed())
    }

    /// Keep only modules whose source path is listed.
    pub fn where_paths(&self, paths: &[PathBuf]) -> ModuleCollection {
        let wanted: BTreeSet<&PathBuf> = paths.iter().collect();
        let modules: Vec<AnalysedModule> = self
            .modules
            .iter()
            .filter(|module| wanted.contains(&module.path))
            .cloned()
            .collect();
        let requested = modules.iter().map(|module| module.path.clone()).collect();
        ModuleCollection::new(requested, modules)
    }

    /// Source paths of the modules with the given names.
    pub fn paths_for_names<'a, I>(&self, names: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let wanted: BTreeSet<&String> = names.into_iter().collect();
        self.modules
            .iter()
            .filter(|module| wanted.contains(&module.name))
            .map(|module| module.path.clone())
            .collect()
    }

    /// Sum of parsed module costs.
    pub fn total_cost(&self) -> f64 {
        self.parsed().map(|module| module.cost).sum()
    }

    /// Collection score from 0 to 100; higher is better.
    pub fn score(&self) -> f64 {
        let costs: Vec<f64> = self
            .parsed()
            .map(|module| module.cost.min(COST_LIMIT))
            .collect();
        if costs.is_empty() {
            return 0.0;
        }
        let average = costs.iter().sum::<f64>() / costs.len() as f64;
        round2(MAX_SCORE - average * (MAX_SCORE / COST_LIMIT))
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules were produced.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
