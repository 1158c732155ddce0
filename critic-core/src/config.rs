//! Run configuration, validated before the working tree is touched.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CriticError, Result};
use crate::workspace::WorkspaceLayout;

/// Default report root.
pub const DEFAULT_ROOT: &str = "tmp/critic";

/// Base and feature branch, plus the optional review request to notify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPair {
    /// Branch the comparison is measured against.
    pub base: String,
    /// Branch under review.
    pub feature: String,
    /// Pull/merge request number.
    pub request_id: Option<u64>,
}

impl BranchPair {
    /// Create a validated pair without a review request.
    pub fn new(base: impl Into<String>, feature: impl Into<String>) -> Result<Self> {
        let pair = Self {
            base: base.into().trim().to_string(),
            feature: feature.into().trim().to_string(),
            request_id: None,
        };
        pair.validate()?;
        Ok(pair)
    }

    /// Attach the review request to notify.
    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Check that both names are present and distinct.
    pub fn validate(&self) -> Result<()> {
        if self.base.is_empty() || self.feature.is_empty() {
            return Err(CriticError::Config(
                "both a base and a feature branch are required".to_string(),
            ));
        }
        if self.base == self.feature {
            return Err(CriticError::Config(format!(
                "base and feature branch are both {}",
                self.base
            )));
        }
        Ok(())
    }
}

impl FromStr for BranchPair {
    type Err = CriticError;

    /// Parse `base,feature[,request_id]`.
    fn from_str(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [base, feature] => BranchPair::new(*base, *feature),
            [base, feature, request_id] => {
                let request_id = parse_request_id(request_id)?;
                Ok(BranchPair::new(*base, *feature)?.with_request_id(request_id))
            }
            _ => Err(CriticError::Config(format!(
                "expected base,feature[,request_id], got {value:?}"
            ))),
        }
    }
}

/// Parse a pull/merge request number.
pub fn parse_request_id(value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        CriticError::Config(format!("request id must be a number, got {value:?}"))
    })
}

/// Parse a movement threshold.
pub fn parse_threshold(value: &str) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(threshold) if threshold.is_finite() => Ok(threshold),
        _ => Err(CriticError::Config(format!(
            "threshold must be a number, got {value:?}"
        ))),
    }
}

/// Everything a comparison run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareConfig {
    /// Branches to compare.
    pub branches: BranchPair,
    /// Maximum allowed total movement; zero or less disables the check.
    pub threshold: f64,
    /// Minimum feature score; zero disables the check.
    pub minimum_score: f64,
    /// Paths to analyse on both branches.
    pub paths: Vec<PathBuf>,
    /// Report root directory.
    pub root: PathBuf,
    /// Build counter file.
    pub counter_file: PathBuf,
}

impl CompareConfig {
    /// Configuration with defaults for everything except the branches.
    pub fn new(branches: BranchPair) -> Self {
        Self {
            branches,
            threshold: 0.0,
            minimum_score: 0.0,
            paths: vec![PathBuf::from(".")],
            root: PathBuf::from(DEFAULT_ROOT),
            counter_file: WorkspaceLayout::default_counter_file(),
        }
    }

    /// Reject configuration that must never reach a branch switch.
    pub fn validate(&self) -> Result<()> {
        self.branches.validate()?;
        if !self.threshold.is_finite() {
            return Err(CriticError::Config("threshold must be finite".to_string()));
        }
        if !self.minimum_score.is_finite() || self.minimum_score < 0.0 {
            return Err(CriticError::Config(format!(
                "minimum score must be zero or more, got {}",
                self.minimum_score
            )));
        }
        if self.paths.is_empty() {
            return Err(CriticError::Config("no paths to analyse".to_string()));
        }
        Ok(())
    }

    /// Workspace layout for this run.
    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.root, &self.counter_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_branch_pair_with_and_without_request() {
        let pair: BranchPair = "main, feature/login".parse().expect("pair");
        assert_eq!(pair.base, "main");
        assert_eq!(pair.feature, "feature/login");
        assert_eq!(pair.request_id, None);

        let pair: BranchPair = "main,feature,42".parse().expect("pair with id");
        assert_eq!(pair.request_id, Some(42));
    }

    #[test]
    fn rejects_bad_branch_pairs() {
        for value in ["main", ",feature", "main,", "main,main", "a,b,c,d"] {
            let err = value.parse::<BranchPair>().unwrap_err();
            assert!(matches!(err, CriticError::Config(_)), "{value}");
        }
        let err = "main,feature,abc".parse::<BranchPair>().unwrap_err();
        assert!(err.to_string().contains("request id must be a number"));
    }

    #[test]
    fn threshold_must_be_numeric() {
        assert_eq!(parse_threshold("5").expect("integer"), 5.0);
        assert_eq!(parse_threshold(" 2.5 ").expect("decimal"), 2.5);
        assert!(parse_threshold("five").is_err());
        assert!(parse_threshold("inf").is_err());
    }

    #[test]
    fn validate_rejects_negative_minimum_score_and_empty_paths() {
        let branches = BranchPair::new("main", "feature").expect("pair");
        let mut config = CompareConfig::new(branches);
        assert!(config.validate().is_ok());

        config.minimum_score = -1.0;
        assert!(config.validate().is_err());

        config.minimum_score = 80.0;
        config.paths.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn layout_uses_configured_root() {
        let branches = BranchPair::new("main", "feature").expect("pair");
        let mut config = CompareConfig::new(branches);
        config.root = PathBuf::from("reports");
        let dirs = config.layout().directories_for(1, "main", "feature");
        assert_eq!(dirs.build_dir, PathBuf::from("reports/builds/build_1"));
    }
}
