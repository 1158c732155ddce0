//! Branch comparison: switch, analyse, diff, report, notify, gate.

use std::error::Error;
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analyser::Analyser;
use crate::config::CompareConfig;
use crate::diff::{RegressionResult, diff};
use crate::domain::{BranchRole, ModuleCollection, round2};
use crate::error::{CriticError, Result};
use crate::gate::{Gate, QualityDirection, Verdict, status_message};
use crate::note::{BranchScores, NoteContext};
use crate::notifier::Notifier;
use crate::report::{ReportKind, ReportTarget, Reporter};
use crate::scm::{BranchSwitcher, SourceControlSystem};
use crate::snapshot::SnapshotPair;
use crate::workspace::BuildDirectories;

/// Build details file written to every build directory.
pub const BUILD_DETAILS_FILE: &str = "build_details.txt";

/// Progress of a comparison run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Configuration accepted, nothing touched yet.
    Init,
    /// Working tree is on the base branch.
    BaseSwitched,
    /// Base branch analysed.
    BaseAnalysed,
    /// Working tree is on the feature branch.
    FeatureSwitched,
    /// Feature branch analysed.
    FeatureAnalysed,
    /// Working tree is back on the base branch.
    Restored,
    /// Snapshots compared.
    Diffed,
    /// Reports written.
    Reported,
    /// Review system notified, skipped or failed.
    Notified,
    /// Verdict computed.
    Gated,
    /// Run finished.
    Done,
    /// Run aborted.
    Failed,
}

impl Phase {
    /// Upper-case phase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::BaseSwitched => "BASE_SWITCHED",
            Phase::BaseAnalysed => "BASE_ANALYSED",
            Phase::FeatureSwitched => "FEATURE_SWITCHED",
            Phase::FeatureAnalysed => "FEATURE_ANALYSED",
            Phase::Restored => "RESTORED",
            Phase::Diffed => "DIFFED",
            Phase::Reported => "REPORTED",
            Phase::Notified => "NOTIFIED",
            Phase::Gated => "GATED",
            Phase::Done => "DONE",
            Phase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal error together with the phase that could not be reached.
#[derive(Debug)]
pub struct CompareFailure {
    /// Phase the run was trying to reach.
    pub phase: Phase,
    /// Underlying error.
    pub error: CriticError,
    /// Phases reached before the failure, ending with `Failed`.
    pub reached: Vec<Phase>,
}

impl CompareFailure {
    fn at(reached: &[Phase], phase: Phase, error: CriticError) -> Self {
        warn!("comparison failed entering {phase}: {error}");
        let mut reached = reached.to_vec();
        reached.push(Phase::Failed);
        Self {
            phase,
            error,
            reached,
        }
    }
}

impl fmt::Display for CompareFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "comparison failed at {}: {}", self.phase, self.error)
    }
}

impl Error for CompareFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// What happened to the review-system note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum NotificationStatus {
    /// No review request was configured.
    NotRequested,
    /// A request was configured but no review system is available.
    Skipped(String),
    /// The note was posted.
    Sent,
    /// Posting failed; the run continued.
    Failed(String),
}

impl NotificationStatus {
    fn details_line(&self) -> Option<String> {
        match self {
            NotificationStatus::NotRequested | NotificationStatus::Sent => None,
            NotificationStatus::Skipped(reason) => Some(format!("Notification: skipped ({reason})")),
            NotificationStatus::Failed(reason) => Some(format!("Notification: failed ({reason})")),
        }
    }
}

/// Result of a completed comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareOutcome {
    /// Build number of this run.
    pub build_number: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Base branch name.
    pub base_branch: String,
    /// Feature branch name.
    pub feature_branch: String,
    /// Output directories of this run.
    pub directories: BuildDirectories,
    /// Sum of base snapshot costs.
    pub base_total: f64,
    /// Sum of feature snapshot costs.
    pub feature_total: f64,
    /// Base collection score.
    pub base_score: f64,
    /// Feature collection score.
    pub feature_score: f64,
    /// Regressed, added and removed modules.
    pub regression: RegressionResult,
    /// Gate decision.
    pub verdict: Verdict,
    /// Index of the filtered build report.
    pub report_location: PathBuf,
    /// Review-system note status.
    pub notification: NotificationStatus,
    /// Phases reached, in order.
    pub phases: Vec<Phase>,
    /// Written build details file, when writing succeeded.
    pub details_file: Option<PathBuf>,
}

impl CompareOutcome {
    /// Process exit code: 0 when the gate passed, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        self.verdict.exit_code()
    }
}

/// Orchestrates one comparison between two branches of a shared working tree.
pub struct CompareEngine<'a> {
    config: &'a CompareConfig,
    scs: &'a dyn SourceControlSystem,
    analyser: &'a dyn Analyser,
    reporter: &'a dyn Reporter,
    notifier: Option<&'a Notifier>,
}

impl<'a> CompareEngine<'a> {
    /// Create an engine without a review-system notifier.
    pub fn new(
        config: &'a CompareConfig,
        scs: &'a dyn SourceControlSystem,
        analyser: &'a dyn Analyser,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            config,
            scs,
            analyser,
            reporter,
            notifier: None,
        }
    }

    /// Post a note to the review request when one is configured.
    pub fn with_notifier(mut self, notifier: Option<&'a Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run the comparison.
    ///
    /// The working tree is back on the base branch on every return path.
    pub fn run(&self) -> std::result::Result<CompareOutcome, CompareFailure> {
        let mut phases = vec![Phase::Init];
        self.config
            .validate()
            .map_err(|err| CompareFailure::at(&phases, Phase::Init, err))?;
        let branches = &self.config.branches;
        let started_at = Utc::now();

        let layout = self.config.layout();
        let build_number = layout.next_build_number();
        let directories = layout.directories_for(build_number, &branches.base, &branches.feature);
        info!(
            "build {build_number}: comparing {} against {}",
            branches.feature, branches.base
        );

        let switcher = BranchSwitcher::new(self.scs);
        let guard = switcher
            .checkout_base(&branches.base)
            .map_err(|err| CompareFailure::at(&phases, Phase::BaseSwitched, err))?;
        advance(&mut phases, Phase::BaseSwitched);

        let mut snapshots = SnapshotPair::new();
        let base = self.analyse(BranchRole::Base, &mut snapshots);
        advance(&mut phases, Phase::BaseAnalysed);

        guard
            .switch_to(&branches.feature)
            .map_err(|err| CompareFailure::at(&phases, Phase::FeatureSwitched, err))?;
        advance(&mut phases, Phase::FeatureSwitched);

        let feature = self.analyse(BranchRole::Feature, &mut snapshots);
        advance(&mut phases, Phase::FeatureAnalysed);

        guard
            .release()
            .map_err(|err| CompareFailure::at(&phases, Phase::Restored, err))?;
        advance(&mut phases, Phase::Restored);

        let regression = diff(snapshots.base(), snapshots.feature());
        info!(
            "{} regressed, {} added, {} removed; delta {:.2}",
            regression.regressed_count(),
            regression.new_modules.len(),
            regression.removed_modules.len(),
            regression.rounded_delta()
        );
        advance(&mut phases, Phase::Diffed);

        let report_location = self
            .write_reports(&base, &feature, &regression, &directories)
            .map_err(|err| CompareFailure::at(&phases, Phase::Reported, err))?;
        advance(&mut phases, Phase::Reported);

        let base_score = base.score();
        let feature_score = feature.score();
        // The gate is pure; its verdict goes into the note before GATED is recorded.
        let gate = Gate::new(&branches.base, &branches.feature, self.config.threshold)
            .with_minimum_score(self.config.minimum_score);
        let verdict =
            gate.evaluate_with_score(regression.base_total, regression.feature_total, feature_score);

        let scores = BranchScores {
            base_branch: &branches.base,
            feature_branch: &branches.feature,
            base_score,
            feature_score,
        };
        let notification = self.notify(scores, &regression, &verdict, &report_location);
        advance(&mut phases, Phase::Notified);

        info!("{}", verdict.message);
        advance(&mut phases, Phase::Gated);

        let mut outcome = CompareOutcome {
            build_number,
            started_at,
            base_branch: branches.base.clone(),
            feature_branch: branches.feature.clone(),
            directories,
            base_total: round2(regression.base_total),
            feature_total: round2(regression.feature_total),
            base_score,
            feature_score,
            regression,
            verdict,
            report_location,
            notification,
            phases,
            details_file: None,
        };
        outcome.details_file = match write_build_details(&outcome) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("{err}");
                None
            }
        };
        advance(&mut outcome.phases, Phase::Done);
        Ok(outcome)
    }

    fn analyse(&self, role: BranchRole, snapshots: &mut SnapshotPair) -> ModuleCollection {
        let collection = self.analyser.run(&self.config.paths);
        let unparsable = collection.unparsable().count();
        if unparsable > 0 {
            warn!("{role}: {unparsable} module(s) could not be analysed");
        }
        snapshots.record(role, &collection);
        info!(
            "{role}: {} module(s), total cost {:.2}",
            snapshots.get(role).len(),
            snapshots.get(role).total()
        );
        collection
    }

    fn write_reports(
        &self,
        base: &ModuleCollection,
        feature: &ModuleCollection,
        regression: &RegressionResult,
        directories: &BuildDirectories,
    ) -> Result<PathBuf> {
        let base_index = self
            .reporter
            .generate_report(base, &ReportTarget::new(&directories.base_dir, ReportKind::Base))?;
        let feature_index = self.reporter.generate_report(
            feature,
            &ReportTarget::new(&directories.feature_dir, ReportKind::Feature),
        )?;

        let regressed_paths = feature.paths_for_names(&regression.regressed);
        let filtered = feature.where_paths(&regressed_paths);
        let target = ReportTarget::new(&directories.build_dir, ReportKind::Build)
            .with_link("Base branch report", base_index)
            .with_link("Feature branch report", feature_index);
        self.reporter.generate_report(&filtered, &target)
    }

    fn notify(
        &self,
        scores: BranchScores<'_>,
        regression: &RegressionResult,
        verdict: &Verdict,
        report_location: &Path,
    ) -> NotificationStatus {
        let Some(request_id) = self.config.branches.request_id else {
            return NotificationStatus::NotRequested;
        };
        let Some(notifier) = self.notifier else {
            warn!("request {request_id} not notified: no review system configured");
            return NotificationStatus::Skipped("no review system configured".to_string());
        };
        let context = NoteContext::from_comparison(scores, regression, verdict, report_location);
        match notifier.notify(request_id, &context) {
            Ok(()) => NotificationStatus::Sent,
            Err(err) => {
                warn!("{err}");
                NotificationStatus::Failed(err.to_string())
            }
        }
    }
}

fn advance(phases: &mut Vec<Phase>, phase: Phase) {
    info!("phase {phase}");
    phases.push(phase);
}

/// Result of analysing the working tree once, without a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    /// Collection score.
    pub score: f64,
    /// Sum of parsed module costs.
    pub total_cost: f64,
    /// Number of analysed modules.
    pub modules: usize,
    /// Number of unparsable modules.
    pub unparsable: usize,
    /// Report index.
    pub report_location: PathBuf,
    /// Minimum-score decision.
    pub verdict: Verdict,
}

/// Analyse `paths`, report under `root` and apply the minimum-score rule.
pub fn analyse_once(
    analyser: &dyn Analyser,
    reporter: &dyn Reporter,
    paths: &[PathBuf],
    root: &Path,
    minimum_score: f64,
) -> Result<AnalysisOutcome> {
    let collection = analyser.run(paths);
    let report_location =
        reporter.generate_report(&collection, &ReportTarget::new(root, ReportKind::Analysis))?;
    let score = collection.score();
    let violation = Gate::new("", "", 0.0)
        .with_minimum_score(minimum_score)
        .check_minimum_score(score);
    let verdict = Verdict {
        pass: violation.is_none(),
        message: violation.unwrap_or_else(|| format!("score {score:.2}")),
        quality: QualityDirection::ImprovedOrUnchanged,
    };
    info!("{}", verdict.message);
    Ok(AnalysisOutcome {
        score,
        total_cost: round2(collection.total_cost()),
        modules: collection.len(),
        unparsable: collection.unparsable().count(),
        report_location,
        verdict,
    })
}

/// Render the build details text.
pub fn render_build_details(outcome: &CompareOutcome) -> String {
    let regression = &outcome.regression;
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Base branch ({}) score: {:.2}",
        outcome.base_branch, outcome.base_score
    );
    let _ = writeln!(
        output,
        "Feature branch ({}) score: {:.2}",
        outcome.feature_branch, outcome.feature_score
    );
    let _ = writeln!(output, "{} new module(s) added", regression.new_modules.len());
    let _ = writeln!(output, "{} module(s) removed", regression.removed_modules.len());
    let _ = writeln!(output, "{} module(s) regressed", regression.regressed_count());
    if let Some(line) = outcome.notification.details_line() {
        let _ = writeln!(output, "{line}");
    }
    let gate = if outcome.verdict.pass { "passed" } else { "failed" };
    let _ = writeln!(output, "Gate {gate}: {}", outcome.verdict.message);
    let _ = writeln!(output, "{}", status_message(regression));
    output
}

/// Write the build details file into the build directory.
pub fn write_build_details(outcome: &CompareOutcome) -> Result<PathBuf> {
    let build_dir = &outcome.directories.build_dir;
    std::fs::create_dir_all(build_dir).map_err(|err| {
        CriticError::Report(format!("cannot create {}: {err}", build_dir.display()))
    })?;
    let path = build_dir.join(BUILD_DETAILS_FILE);
    std::fs::write(&path, render_build_details(outcome)).map_err(|err| {
        CriticError::Report(format!("cannot write {}: {err}", path.display()))
    })?;
    Ok(path)
}
