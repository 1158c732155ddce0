#![deny(missing_docs)]
//! Critic core library.
//!
//! Analyses a source tree on a base and a feature branch, compares
//! per-module costs, reports regressed modules and gates the result.

pub mod analyser;
pub mod config;
pub mod diff;
pub mod domain;
/// Comparison orchestration and build details.
pub mod engine;
pub mod error;
pub mod fs;
pub mod gate;
pub mod note;
pub mod notifier;
pub mod report;
pub mod scm;
pub mod snapshot;
pub mod workspace;

pub use analyser::{Analyser, TokeiAnalyser, module_name};
pub use config::{BranchPair, CompareConfig, DEFAULT_ROOT, parse_request_id, parse_threshold};
pub use diff::{RegressionResult, diff};
pub use domain::{
    AnalysedModule, BranchRole, ModuleCollection, ModuleStatus, Rating, Smell, UNPARSABLE_COST,
};
pub use engine::{
    AnalysisOutcome, BUILD_DETAILS_FILE, CompareEngine, CompareFailure, CompareOutcome,
    NotificationStatus, Phase, analyse_once, render_build_details, write_build_details,
};
pub use error::{CriticError, Result};
pub use fs::{FileSystem, StdFileSystem};
pub use gate::{Gate, QualityDirection, Verdict, status_message};
pub use note::{
    BranchScores, CRITIC_REGRESSIONS, CRITIC_REPORT, CRITIC_SUMMARY, CRITIC_VERDICT, NoteContext,
    find_note_template, load_note_template, render_note,
};
pub use notifier::{
    GitHubReviewClient, GitLabReviewClient, Notifier, ReviewClient, ReviewSettings, ReviewSystem,
};
pub use report::{
    FileReporter, ReportFormat, ReportKind, ReportOptions, ReportTarget, Reporter, open_report,
};
pub use scm::{
    BranchSwitcher, CheckoutGuard, ChurnSource, DetectedSourceControl, GitSourceControl,
    NoSourceControl, SourceControlSystem, detect_source_control,
};
pub use snapshot::{CostSnapshot, SnapshotPair};
pub use workspace::{BuildDirectories, WorkspaceLayout};
