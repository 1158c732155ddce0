//! Report rendering for analysed module collections.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysedModule, ModuleCollection, ModuleStatus, round2};
use crate::error::{CriticError, Result};

/// Markdown overview file name.
pub const OVERVIEW_FILE: &str = "overview.md";
/// Markdown module table file name.
pub const CODE_INDEX_FILE: &str = "code_index.md";
/// JSON report file name.
pub const JSON_FILE: &str = "report.json";

/// Output format for reports.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Markdown files.
    #[default]
    Markdown,
    /// A single JSON document.
    Json,
    /// Plain text on standard output.
    Console,
}

/// Which run a report describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Full report of the base branch.
    Base,
    /// Full report of the feature branch.
    Feature,
    /// Regressed modules of one build.
    Build,
    /// Single analysis of the working tree.
    Analysis,
}

impl ReportKind {
    fn title(&self) -> &'static str {
        match self {
            ReportKind::Base => "Base branch report",
            ReportKind::Feature => "Feature branch report",
            ReportKind::Build => "Build report",
            ReportKind::Analysis => "Analysis report",
        }
    }
}

/// Link from one report to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLink {
    /// Link text.
    pub label: String,
    /// Location of the linked report.
    pub path: PathBuf,
}

/// Where and what a reporter writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTarget {
    /// Directory receiving the report files.
    pub root: PathBuf,
    /// Which run is being reported.
    pub kind: ReportKind,
    /// Related reports, e.g. the branch overviews of a build report.
    pub links: Vec<ReportLink>,
}

impl ReportTarget {
    /// Create a target without links.
    pub fn new(root: impl Into<PathBuf>, kind: ReportKind) -> Self {
        Self {
            root: root.into(),
            kind,
            links: Vec::new(),
        }
    }

    /// Add a link to another report.
    pub fn with_link(mut self, label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.links.push(ReportLink {
            label: label.into(),
            path: path.into(),
        });
        self
    }
}

/// Writes a report for a collection and returns the index location.
#[cfg_attr(test, mockall::automock)]
pub trait Reporter {
    /// Render `collection` under `target.root`.
    fn generate_report(&self, collection: &ModuleCollection, target: &ReportTarget)
    -> Result<PathBuf>;
}

/// Rendering options shared by every report of a run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Output format.
    pub format: ReportFormat,
    /// Hide letter ratings.
    pub suppress_ratings: bool,
}

/// Reporter writing files under the target directory.
#[derive(Debug, Clone, Default)]
pub struct FileReporter {
    options: ReportOptions,
}

impl FileReporter {
    /// Create a reporter with the given options.
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }
}

impl Reporter for FileReporter {
    fn generate_report(
        &self,
        collection: &ModuleCollection,
        target: &ReportTarget,
    ) -> Result<PathBuf> {
        let target = &with_absolute_links(target);
        match self.options.format {
            ReportFormat::Markdown => {
                create_root(&target.root)?;
                let overview = target.root.join(OVERVIEW_FILE);
                write_file(&overview, &render_overview_markdown(collection, target))?;
                write_file(
                    &target.root.join(CODE_INDEX_FILE),
                    &render_code_index_markdown(collection, self.options.suppress_ratings),
                )?;
                info!("wrote {}", overview.display());
                Ok(overview)
            }
            ReportFormat::Json => {
                create_root(&target.root)?;
                let path = target.root.join(JSON_FILE);
                write_file(&path, &render_json(collection, target)?)?;
                info!("wrote {}", path.display());
                Ok(path)
            }
            ReportFormat::Console => {
                print!(
                    "{}",
                    render_console(collection, target, self.options.suppress_ratings)
                );
                Ok(target.root.clone())
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    kind: ReportKind,
    generated_at: DateTime<Utc>,
    score: f64,
    total_cost: f64,
    modules: &'a [AnalysedModule],
    missing: &'a [PathBuf],
    links: &'a [ReportLink],
}

/// Render the summary page as Markdown.
pub fn render_overview_markdown(collection: &ModuleCollection, target: &ReportTarget) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# {}\n", target.kind.title());
    let _ = writeln!(output, "- Score: {:.2}/100", collection.score());
    let _ = writeln!(output, "- Total cost: {:.2}", collection.total_cost());
    let _ = writeln!(
        output,
        "- Modules: {} ({} unparsable)",
        collection.len(),
        collection.unparsable().count()
    );
    let _ = writeln!(output, "- Module details: [{CODE_INDEX_FILE}]({CODE_INDEX_FILE})");
    let _ = writeln!(output);
    append_links(&mut output, &target.links);
    append_paths(&mut output, "Missing paths", &collection.missing);
    append_unparsable(&mut output, collection);
    output
}

/// Render the module table as Markdown.
pub fn render_code_index_markdown(collection: &ModuleCollection, suppress_ratings: bool) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Modules\n");
    if collection.is_empty() {
        let _ = writeln!(output, "No modules analysed.");
        return output;
    }
    if suppress_ratings {
        let _ = writeln!(
            output,
            "| Module | Cost | Complexity | Duplication | Churn | Methods | Smells |"
        );
        let _ = writeln!(output, "| --- | --- | --- | --- | --- | --- | --- |");
    } else {
        let _ = writeln!(
            output,
            "| Module | Rating | Cost | Complexity | Duplication | Churn | Methods | Smells |"
        );
        let _ = writeln!(output, "| --- | --- | --- | --- | --- | --- | --- | --- |");
    }
    for module in collection.parsed() {
        let rating = if suppress_ratings {
            String::new()
        } else {
            format!(" {} |", module.rating())
        };
        let _ = writeln!(
            output,
            "| {} |{} {:.2} | {:.0} | {:.0} | {} | {} | {} |",
            module.name,
            rating,
            module.cost,
            module.complexity,
            module.duplication,
            module.churn,
            module.methods_count,
            format_smells(module)
        );
    }
    output
}

/// Render a collection as pretty JSON.
pub fn render_json(collection: &ModuleCollection, target: &ReportTarget) -> Result<String> {
    let report = JsonReport {
        kind: target.kind,
        generated_at: Utc::now(),
        score: collection.score(),
        total_cost: round2(collection.total_cost()),
        modules: &collection.modules,
        missing: &collection.missing,
        links: &target.links,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Render a collection as plain text.
pub fn render_console(
    collection: &ModuleCollection,
    target: &ReportTarget,
    suppress_ratings: bool,
) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{}: score {:.2}, total cost {:.2}",
        target.kind.title(),
        collection.score(),
        collection.total_cost()
    );
    for module in &collection.modules {
        match &module.status {
            ModuleStatus::Parsed if suppress_ratings => {
                let _ = writeln!(output, "  {:<40} {:>8.2}", module.name, module.cost);
            }
            ModuleStatus::Parsed => {
                let _ = writeln!(
                    output,
                    "  {:<40} {:>8.2}  {}",
                    module.name,
                    module.cost,
                    module.rating()
                );
            }
            ModuleStatus::Unparsable(reason) => {
                let _ = writeln!(output, "  {:<40} unparsable: {reason}", module.name);
            }
        }
    }
    for path in &collection.missing {
        let _ = writeln!(output, "  missing: {}", path.display());
    }
    output
}

/// Open a report index with the platform opener.
///
/// Returns whether an opener was launched; failures are only logged.
pub fn open_report(path: &Path, no_browser: bool) -> bool {
    if no_browser {
        return false;
    }
    let mut command = opener_command(path);
    match command.spawn() {
        Ok(_) => true,
        Err(err) => {
            warn!("could not open {}: {err}", path.display());
            false
        }
    }
}

#[cfg(target_os = "macos")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(path);
    command
}

#[cfg(target_os = "windows")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(path);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    command
}

fn create_root(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|err| {
        CriticError::Report(format!("cannot create {}: {err}", root.display()))
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)
        .map_err(|err| CriticError::Report(format!("cannot write {}: {err}", path.display())))
}

fn format_smells(module: &AnalysedModule) -> String {
    if module.smells.is_empty() {
        return "-".to_string();
    }
    module
        .smells
        .iter()
        .map(|smell| smell.id.as_str())
        .collect::<Vec<&str>>()
        .join(", ")
}

fn append_links(output: &mut String, links: &[ReportLink]) {
    if links.is_empty() {
        return;
    }
    let _ = writeln!(output, "## Related reports\n");
    for link in links {
        let _ = writeln!(output, "- [{}]({})", link.label, link_destination(&link.path));
    }
    let _ = writeln!(output);
}

// Absolute paths become file URLs so links work from any report directory.
fn link_destination(path: &Path) -> String {
    if path.is_absolute() {
        format!("file://{}", path.display().to_string().replace(' ', "%20"))
    } else {
        path.display().to_string()
    }
}

fn with_absolute_links(target: &ReportTarget) -> ReportTarget {
    let mut target = target.clone();
    for link in &mut target.links {
        link.path = absolute_path(&link.path);
    }
    target
}

fn absolute_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(err) => {
            debug!("cannot resolve {}: {err}", path.display());
            path.to_path_buf()
        }
    }
}

fn append_paths(output: &mut String, title: &str, paths: &[PathBuf]) {
    if paths.is_empty() {
        return;
    }
    let _ = writeln!(output, "## {title}\n");
    for path in paths {
        let _ = writeln!(output, "- {}", path.display());
    }
    let _ = writeln!(output);
}

fn append_unparsable(output: &mut String, collection: &ModuleCollection) {
    let unparsable: Vec<&AnalysedModule> = collection.unparsable().collect();
    if unparsable.is_empty() {
        return;
    }
    let _ = writeln!(output, "## Unparsable modules\n");
    for module in unparsable {
        if let ModuleStatus::Unparsable(reason) = &module.status {
            let _ = writeln!(output, "- {} ({reason})", module.path.display());
        }
    }
    let _ = writeln!(output);
}
