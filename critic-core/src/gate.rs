//! Threshold policy deciding whether a comparison passes.

use serde::{Deserialize, Serialize};

use crate::diff::RegressionResult;
use crate::domain::round2;

/// Direction of the aggregate quality movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDirection {
    /// Feature total is lower than or equal to base total.
    ImprovedOrUnchanged,
    /// Feature total is higher than base total.
    Degraded,
}

/// Pass/fail decision for a comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the gate passed.
    pub pass: bool,
    /// Human-readable explanation naming both branches and totals.
    pub message: String,
    /// Quality direction, independent of `pass`.
    pub quality: QualityDirection,
}

impl Verdict {
    /// Process exit code for this verdict.
    pub fn exit_code(&self) -> u8 {
        if self.pass { 0 } else { 1 }
    }
}

/// Gate configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    base_branch: String,
    feature_branch: String,
    threshold: f64,
    minimum_score: f64,
}

impl Gate {
    /// Create a gate; a threshold of zero or less disables the movement check.
    pub fn new(
        base_branch: impl Into<String>,
        feature_branch: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Self {
            base_branch: base_branch.into(),
            feature_branch: feature_branch.into(),
            threshold,
            minimum_score: 0.0,
        }
    }

    /// Also fail when the feature score falls below `minimum_score`.
    pub fn with_minimum_score(mut self, minimum_score: f64) -> Self {
        self.minimum_score = minimum_score;
        self
    }

    /// Evaluate the movement between two totals.
    ///
    /// Fails when the threshold is positive and `|feature - base| > threshold`.
    /// Large improvements count against the threshold the same way regressions do.
    pub fn evaluate(&self, base_total: f64, feature_total: f64) -> Verdict {
        let delta = round2((feature_total - base_total).abs());
        let quality = if feature_total > base_total {
            QualityDirection::Degraded
        } else {
            QualityDirection::ImprovedOrUnchanged
        };
        let totals = format!(
            "base branch ({}) total {:.2}, feature branch ({}) total {:.2}",
            self.base_branch, base_total, self.feature_branch, feature_total
        );

        if self.threshold <= 0.0 {
            return Verdict {
                pass: true,
                message: format!("{totals}; delta {delta:.2}, no threshold configured"),
                quality,
            };
        }

        let pass = (feature_total - base_total).abs() <= self.threshold;
        let outcome = if pass { "within" } else { "exceeds" };
        Verdict {
            pass,
            message: format!(
                "{totals}; delta {delta:.2} {outcome} threshold {:.2}",
                self.threshold
            ),
            quality,
        }
    }

    /// Evaluate movement plus the minimum-score rule.
    pub fn evaluate_with_score(
        &self,
        base_total: f64,
        feature_total: f64,
        feature_score: f64,
    ) -> Verdict {
        let mut verdict = self.evaluate(base_total, feature_total);
        if let Some(violation) = self.check_minimum_score(feature_score) {
            verdict.pass = false;
            verdict.message = format!("{}; {violation}", verdict.message);
        }
        verdict
    }

    /// Violation message when the score is below the configured minimum.
    pub fn check_minimum_score(&self, score: f64) -> Option<String> {
        if self.minimum_score > 0.0 && score < self.minimum_score {
            Some(format!(
                "score {score:.2} is below the minimum {:.2}",
                self.minimum_score
            ))
        } else {
            None
        }
    }
}

/// Build the human-readable status line for a comparison.
pub fn status_message(result: &RegressionResult) -> String {
    if result.regressed.is_empty() && !result.is_degraded() {
        return "Quality improved or unchanged".to_string();
    }
    if result.regressed.is_empty() {
        return format!(
            "Quality degraded: total cost rose by {:.2} with no module regressions",
            result.rounded_delta()
        );
    }
    let names: Vec<&str> = result.regressed.iter().map(String::as_str).collect();
    format!(
        "Quality degraded: {} module(s) regressed ({})",
        names.len(),
        names.join(", ")
    )
}
