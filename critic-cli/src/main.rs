#![deny(missing_docs)]
//! Critic command-line interface.
//!
//! Analyses the working tree, or compares a feature branch against a base
//! branch and exits non-zero when the quality gate fails.

use clap::{Parser, ValueEnum};
use critic_core::{
    BranchPair, CompareConfig, CompareEngine, CriticError, DEFAULT_ROOT, FileReporter, Notifier,
    ReportFormat, ReportOptions, ReviewSettings, SourceControlSystem, StdFileSystem,
    TokeiAnalyser, analyse_once, detect_source_control, load_note_template, open_report,
    parse_threshold, render_build_details,
};
#[cfg(not(test))]
use log::error;
use log::{info, warn};
use std::path::{Path, PathBuf};

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Exit code for errors that abort the run.
#[cfg(not(test))]
const FATAL_EXIT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "critic", version, about = "Code quality regression gate")]
struct Cli {
    /// Directory receiving the reports.
    #[arg(short = 'p', long = "path", default_value = DEFAULT_ROOT)]
    path: PathBuf,
    /// Compare two branches: base,feature[,request_id].
    #[arg(short = 'b', long = "branch", value_parser = parse_branches, conflicts_with = "mode_ci")]
    branch: Option<BranchPair>,
    /// Maximum allowed movement of the total cost; 0 disables the check.
    #[arg(
        short = 't',
        long = "maximum-decrease",
        value_parser = parse_threshold_arg,
        default_value = "0"
    )]
    threshold: f64,
    /// Report format.
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Markdown)]
    format: OutputFormat,
    /// Fail when the score falls below this value.
    #[arg(short = 's', long = "minimum-score", default_value_t = 0.0)]
    minimum_score: f64,
    /// Compare the current branch against BASE (default master).
    #[arg(
        short = 'm',
        long = "mode-ci",
        value_name = "BASE",
        num_args = 0..=1,
        default_missing_value = "master"
    )]
    mode_ci: Option<String>,
    /// Analyse symlinked files once.
    #[arg(long)]
    deduplicate_symlinks: bool,
    /// Hide letter ratings in reports.
    #[arg(long)]
    suppress_ratings: bool,
    /// Never open the report in a browser.
    #[arg(long)]
    no_browser: bool,
    /// File holding the build counter.
    #[arg(long, env = "CRITIC_COUNTER_FILE")]
    counter_file: Option<PathBuf>,
    /// Files or directories to analyse.
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Markdown,
    Json,
    Console,
}

impl From<OutputFormat> for ReportFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Markdown => ReportFormat::Markdown,
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Console => ReportFormat::Console,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Analyse,
    Compare(BranchPair),
}

#[cfg(not(test))]
fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let code = match std::env::current_dir() {
        Ok(repo_dir) => match run(&cli, &repo_dir) {
            Ok(code) => code,
            Err(err) => {
                error!("{err}");
                FATAL_EXIT
            }
        },
        Err(err) => {
            error!("cannot read current directory: {err}");
            FATAL_EXIT
        }
    };
    std::process::ExitCode::from(code)
}

#[cfg(test)]
fn main() {}

fn parse_branches(value: &str) -> Result<BranchPair, CriticError> {
    value.parse()
}

fn parse_threshold_arg(value: &str) -> Result<f64, CriticError> {
    parse_threshold(value)
}

fn run(cli: &Cli, repo_dir: &Path) -> CliResult<u8> {
    if !cli.minimum_score.is_finite() || cli.minimum_score < 0.0 {
        return Err(Box::new(CriticError::Config(format!(
            "minimum score must be zero or more, got {}",
            cli.minimum_score
        ))));
    }
    let detected = detect_source_control(repo_dir);
    let reporter = FileReporter::new(ReportOptions {
        format: cli.format.into(),
        suppress_ratings: cli.suppress_ratings,
    });
    let analyser = TokeiAnalyser::new(StdFileSystem::new(), repo_dir)
        .with_churn(detected.as_churn())
        .deduplicate_symlinks(cli.deduplicate_symlinks);

    match resolve_mode(cli, detected.as_scs())? {
        Mode::Analyse => {
            let outcome = analyse_once(
                &analyser,
                &reporter,
                &cli.paths,
                &cli.path,
                cli.minimum_score,
            )?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "Score: {:.2} ({} modules, {} unparsable)",
                    outcome.score, outcome.modules, outcome.unparsable
                );
                println!("{}", outcome.verdict.message);
            }
            open_report(&outcome.report_location, browser_suppressed(cli));
            Ok(outcome.verdict.exit_code())
        }
        Mode::Compare(branches) => {
            let config = compare_config(cli, branches);
            config.validate()?;
            let notifier = build_notifier(&config, repo_dir);
            let outcome = CompareEngine::new(&config, detected.as_scs(), &analyser, &reporter)
                .with_notifier(notifier.as_ref())
                .run()?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", render_build_details(&outcome));
            }
            open_report(&outcome.report_location, browser_suppressed(cli));
            Ok(outcome.exit_code())
        }
    }
}

fn resolve_mode(cli: &Cli, scs: &dyn SourceControlSystem) -> CliResult<Mode> {
    if let Some(branches) = &cli.branch {
        return Ok(Mode::Compare(branches.clone()));
    }
    if let Some(base) = &cli.mode_ci {
        let feature = scs.current_branch()?;
        info!("ci mode: comparing {feature} against {base}");
        return Ok(Mode::Compare(BranchPair::new(base.as_str(), feature)?));
    }
    Ok(Mode::Analyse)
}

fn compare_config(cli: &Cli, branches: BranchPair) -> CompareConfig {
    let mut config = CompareConfig::new(branches);
    config.threshold = cli.threshold;
    config.minimum_score = cli.minimum_score;
    config.paths = cli.paths.clone();
    config.root = cli.path.clone();
    if let Some(counter_file) = &cli.counter_file {
        config.counter_file = counter_file.clone();
    }
    config
}

fn build_notifier(config: &CompareConfig, repo_dir: &Path) -> Option<Notifier> {
    config.branches.request_id?;
    let settings = match ReviewSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            warn!("review notes disabled: {err}");
            return None;
        }
    };
    let client = match settings.client() {
        Ok(client) => client,
        Err(err) => {
            warn!("review notes disabled: {err}");
            return None;
        }
    };
    let template = load_note_template(&StdFileSystem::new(), repo_dir).unwrap_or_else(|err| {
        warn!("ignoring note template: {err}");
        None
    });
    Some(Notifier::new(client).with_template(template))
}

// Console reports have no index file to open.
fn browser_suppressed(cli: &Cli) -> bool {
    cli.no_browser || cli.format == OutputFormat::Console
}
