//! Review note rendering with Critic placeholders.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::diff::RegressionResult;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::gate::{Verdict, status_message};

/// Placeholder token for the score summary.
pub const CRITIC_SUMMARY: &str = "{{CRITIC_SUMMARY}}";
/// Placeholder token for the gate verdict.
pub const CRITIC_VERDICT: &str = "{{CRITIC_VERDICT}}";
/// Placeholder token for the regressed module list.
pub const CRITIC_REGRESSIONS: &str = "{{CRITIC_REGRESSIONS}}";
/// Placeholder token for the report location.
pub const CRITIC_REPORT: &str = "{{CRITIC_REPORT}}";

const DEFAULT_NOTE: &str = "### Critic comparison\n\n{{CRITIC_VERDICT}}\n\n{{CRITIC_SUMMARY}}\n\n{{CRITIC_REGRESSIONS}}\n\nReport: {{CRITIC_REPORT}}\n";

/// Values substituted into a note template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteContext {
    /// Text replacement for the verdict placeholder.
    pub verdict: String,
    /// Text replacement for the summary placeholder.
    pub summary: String,
    /// Text replacement for the regressions placeholder.
    pub regressions: String,
    /// Text replacement for the report placeholder.
    pub report: String,
}

/// Scores of both branches for the note summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchScores<'a> {
    /// Base branch name.
    pub base_branch: &'a str,
    /// Feature branch name.
    pub feature_branch: &'a str,
    /// Base collection score.
    pub base_score: f64,
    /// Feature collection score.
    pub feature_score: f64,
}

impl NoteContext {
    /// Build a context from a comparison result and its gate verdict.
    pub fn from_comparison(
        scores: BranchScores<'_>,
        regression: &RegressionResult,
        verdict: &Verdict,
        report_location: &Path,
    ) -> Self {
        Self {
            verdict: format_verdict(verdict),
            summary: format_summary(scores, regression),
            regressions: format_regressions(regression),
            report: report_location.display().to_string(),
        }
    }
}

/// Load the repository's note template, if one exists.
pub fn load_note_template<F: FileSystem>(fs: &F, repo_root: &Path) -> Result<Option<String>> {
    let Some(path) = find_note_template(repo_root) else {
        return Ok(None);
    };
    Ok(Some(fs.read_to_string(&path)?))
}

/// Locate a note template in the repository.
pub fn find_note_template(repo_root: &Path) -> Option<PathBuf> {
    let candidates = [
        repo_root.join(".github").join("CRITIC_NOTE.md"),
        repo_root.join("CRITIC_NOTE.md"),
    ];
    candidates.into_iter().find(|path| path.is_file())
}

/// Render a note from `template`, or from the built-in note when absent.
pub fn render_note(template: Option<&str>, context: &NoteContext) -> String {
    let template = template.unwrap_or(DEFAULT_NOTE);
    template
        .replace(CRITIC_VERDICT, context.verdict.trim())
        .replace(CRITIC_SUMMARY, context.summary.trim())
        .replace(CRITIC_REGRESSIONS, context.regressions.trim())
        .replace(CRITIC_REPORT, context.report.trim())
}

fn format_verdict(verdict: &Verdict) -> String {
    let outcome = if verdict.pass { "passed" } else { "failed" };
    format!("**Quality gate {outcome}:** {}", verdict.message)
}

fn format_summary(scores: BranchScores<'_>, regression: &RegressionResult) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "- Base branch ({}) score: {:.2}",
        scores.base_branch, scores.base_score
    );
    let _ = writeln!(
        output,
        "- Feature branch ({}) score: {:.2}",
        scores.feature_branch, scores.feature_score
    );
    let _ = writeln!(
        output,
        "- Total cost: {:.2} -> {:.2} (delta {:.2})",
        regression.base_total,
        regression.feature_total,
        regression.rounded_delta()
    );
    let _ = writeln!(output, "- {}", status_message(regression));
    output.trim_end().to_string()
}

fn format_regressions(regression: &RegressionResult) -> String {
    if regression.regressed.is_empty() {
        return "No modules regressed.".to_string();
    }
    let mut output = String::new();
    let _ = writeln!(output, "Regressed modules:");
    for name in &regression.regressed {
        let _ = writeln!(output, "- `{name}`");
    }
    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::fs::MockFileSystem;
    use crate::gate::Gate;
    use crate::snapshot::CostSnapshot;

    fn context() -> NoteContext {
        let base: CostSnapshot = [("empty", 8.0), ("unparsable", 4.0)].into_iter().collect();
        let feature: CostSnapshot = [("empty", 8.0), ("unparsable", 5.0)].into_iter().collect();
        let scores = BranchScores {
            base_branch: "main",
            feature_branch: "feature",
            base_score: 81.25,
            feature_score: 79.69,
        };
        let regression = diff(&base, &feature);
        let verdict = Gate::new("main", "feature", 0.0)
            .evaluate(regression.base_total, regression.feature_total);
        NoteContext::from_comparison(
            scores,
            &regression,
            &verdict,
            Path::new("tmp/critic/builds/build_3/overview.md"),
        )
    }

    #[test]
    fn default_note_fills_every_placeholder() {
        let note = render_note(None, &context());

        assert!(note.contains("Base branch (main) score: 81.25"));
        assert!(note.contains("Feature branch (feature) score: 79.69"));
        assert!(note.contains("Total cost: 12.00 -> 13.00 (delta 1.00)"));
        assert!(note.contains("- `unparsable`"));
        assert!(note.contains("Report: tmp/critic/builds/build_3/overview.md"));
        assert!(note.contains("**Quality gate passed:**"));
        assert!(!note.contains("{{"));
    }

    #[test]
    fn failed_gate_is_stated_in_the_note() {
        let base: CostSnapshot = [("a", 2.0)].into_iter().collect();
        let feature: CostSnapshot = [("a", 40.0)].into_iter().collect();
        let regression = diff(&base, &feature);
        let verdict = Gate::new("main", "feature", 5.0)
            .evaluate(regression.base_total, regression.feature_total);
        let scores = BranchScores {
            base_branch: "main",
            feature_branch: "feature",
            base_score: 93.75,
            feature_score: 0.0,
        };
        let context =
            NoteContext::from_comparison(scores, &regression, &verdict, Path::new("overview.md"));

        let note = render_note(Some("{{CRITIC_VERDICT}}"), &context);
        assert!(note.starts_with("**Quality gate failed:**"));
        assert!(note.contains(&verdict.message));
    }

    #[test]
    fn custom_template_keeps_surrounding_text() {
        let note = render_note(Some("Quality\n{{CRITIC_REPORT}}\nthanks"), &context());
        assert_eq!(note, "Quality\ntmp/critic/builds/build_3/overview.md\nthanks");
    }

    #[test]
    fn missing_template_loads_nothing() {
        let fs = MockFileSystem::new();
        let root = std::env::temp_dir().join("critic_note_missing_template");
        let template = load_note_template(&fs, &root).expect("load template");
        assert!(template.is_none());
    }
}
