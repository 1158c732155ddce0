//! Per-module metrics for a source tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use tokei::{Config, LanguageType};

use crate::domain::{AnalysedModule, ModuleCollection, ModuleStatus, Smell, round2};
use crate::fs::FileSystem;
use crate::scm::ChurnSource;

const COMPLEXITY_FACTOR: f64 = 25.0;
const DUPLICATION_FACTOR: f64 = 25.0;
const HIGH_COMPLEXITY: f64 = 25.0;
const LONG_MODULE_LINES: usize = 300;
const HIGH_CHURN: u32 = 20;
const DUPLICATE_MIN_CHARS: usize = 20;

const DECISION_KEYWORDS: &[&str] = &[
    "if", "elif", "elsif", "unless", "for", "while", "until", "loop", "match", "case", "when",
    "catch", "rescue", "except",
];
const DEFINITION_KEYWORDS: &[&str] = &["fn", "def", "function", "func"];

/// Produces a module collection for a set of paths on the current tree.
pub trait Analyser {
    /// Analyse every source file reachable from `paths`.
    fn run(&self, paths: &[PathBuf]) -> ModuleCollection;
}

/// Analyser that uses `tokei` to find and measure source files.
pub struct TokeiAnalyser<'a, F: FileSystem> {
    fs: F,
    config: Config,
    root: PathBuf,
    churn: Option<&'a dyn ChurnSource>,
    deduplicate_symlinks: bool,
}

impl<'a, F: FileSystem> TokeiAnalyser<'a, F> {
    /// Create an analyser naming modules relative to `root`.
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            config: Config::default(),
            root: root.into(),
            churn: None,
            deduplicate_symlinks: false,
        }
    }

    /// Look up revision counts for churn.
    pub fn with_churn(mut self, churn: &'a dyn ChurnSource) -> Self {
        self.churn = Some(churn);
        self
    }

    /// Analyse files that resolve to the same target only once.
    pub fn deduplicate_symlinks(mut self, enabled: bool) -> Self {
        self.deduplicate_symlinks = enabled;
        self
    }

    fn source_files(&self, root: &Path) -> Result<Vec<PathBuf>, String> {
        let files = self.fs.list_files(root).map_err(|err| err.to_string())?;
        Ok(files
            .into_iter()
            .filter(|path| LanguageType::from_path(path, &self.config).is_some())
            .collect())
    }

    fn dedup_key(&self, path: &Path) -> PathBuf {
        if !self.deduplicate_symlinks {
            return path.to_path_buf();
        }
        match self.fs.canonicalize(path) {
            Ok(target) => target,
            Err(err) => {
                debug!("cannot resolve {}: {err}", path.display());
                path.to_path_buf()
            }
        }
    }

    fn analyse_file(&self, path: &Path) -> AnalysedModule {
        let name = module_name(&self.root, path);
        let contents = match self.fs.read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("skipping unparsable module {}: {err}", path.display());
                return AnalysedModule::unparsable(name, path.to_path_buf(), err.to_string());
            }
        };
        let Some(language) = LanguageType::from_path(path, &self.config) else {
            return AnalysedModule::unparsable(name, path.to_path_buf(), "unknown language");
        };

        let stats = language.parse_from_str(&contents, &self.config);
        let code = code_lines(&contents, language);
        let complexity = code.iter().map(|line| decision_points(line)).sum::<usize>() as f64;
        let duplication = duplicated_mass(&code) as f64;
        let methods_count = code.iter().filter(|line| is_definition(line)).count();
        let churn = self.revision_count(path);
        let smells = detect_smells(complexity, duplication, stats.code, churn);
        let cost = complexity / COMPLEXITY_FACTOR
            + duplication / DUPLICATION_FACTOR
            + smells.iter().map(|smell| smell.cost).sum::<f64>();

        AnalysedModule {
            name,
            path: path.to_path_buf(),
            cost: round2(cost),
            complexity,
            duplication,
            churn,
            methods_count,
            smells,
            status: ModuleStatus::Parsed,
        }
    }

    fn revision_count(&self, path: &Path) -> u32 {
        let Some(churn) = self.churn else {
            return 0;
        };
        match churn.revision_count(path) {
            Ok(count) => count,
            Err(err) => {
                debug!("churn unavailable for {}: {err}", path.display());
                0
            }
        }
    }
}

impl<F: FileSystem> Analyser for TokeiAnalyser<'_, F> {
    fn run(&self, paths: &[PathBuf]) -> ModuleCollection {
        let mut collection = ModuleCollection::new(paths.to_vec(), Vec::new());
        let mut seen = BTreeSet::new();

        for requested in paths {
            if !self.fs.exists(requested) {
                warn!("requested path {} does not exist", requested.display());
                collection.missing.push(requested.clone());
                continue;
            }
            let files = match self.source_files(requested) {
                Ok(files) => files,
                Err(err) => {
                    warn!("cannot list {}: {err}", requested.display());
                    collection.modules.push(AnalysedModule::unparsable(
                        module_name(&self.root, requested),
                        requested.clone(),
                        err,
                    ));
                    continue;
                }
            };
            for file in files {
                if !seen.insert(self.dedup_key(&file)) {
                    continue;
                }
                collection.modules.push(self.analyse_file(&file));
            }
        }

        collection
    }
}

/// Stable module name: the path relative to `root`, without extension, joined with `::`.
pub fn module_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let relative = relative.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        path.to_string_lossy().to_string()
    } else {
        parts.join("::")
    }
}

// Trimmed non-blank lines outside the language's comments and doc strings.
fn code_lines(text: &str, language: LanguageType) -> Vec<&str> {
    let line_comments = language.line_comments();
    let blocks: Vec<(&str, &str)> = language
        .multi_line_comments()
        .iter()
        .chain(language.doc_quotes())
        .copied()
        .collect();
    let mut closing: Option<&str> = None;
    let mut code = Vec::new();

    for raw in text.lines() {
        let mut line = raw.trim();
        if let Some(end) = closing {
            let Some(index) = line.find(end) else {
                continue;
            };
            closing = None;
            line = line[index + end.len()..].trim();
        }
        if line.is_empty() || line_comments.iter().any(|prefix| line.starts_with(prefix)) {
            continue;
        }
        if let Some((start, end)) = blocks.iter().find(|(start, _)| line.starts_with(start)) {
            if !line[start.len()..].contains(end) {
                closing = Some(end);
            }
            continue;
        }
        code.push(line);
    }
    code
}

fn words(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
}

fn decision_points(line: &str) -> usize {
    let keywords = words(line)
        .filter(|word| DECISION_KEYWORDS.contains(word))
        .count();
    keywords + line.matches("&&").count() + line.matches("||").count()
}

fn is_definition(line: &str) -> bool {
    words(line).any(|word| DEFINITION_KEYWORDS.contains(&word))
}

// Each repeat of a long line beyond its first occurrence adds one to the mass.
fn duplicated_mass(code: &[&str]) -> usize {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for line in code.iter().filter(|line| line.len() >= DUPLICATE_MIN_CHARS) {
        *counts.entry(line).or_insert(0) += 1;
    }
    counts.values().filter(|count| **count > 1).map(|count| count - 1).sum()
}

fn detect_smells(complexity: f64, duplication: f64, code_lines: usize, churn: u32) -> Vec<Smell> {
    let mut smells = Vec::new();
    if complexity > HIGH_COMPLEXITY {
        smells.push(Smell {
            id: "high-complexity".to_string(),
            message: format!("complexity {complexity:.0} exceeds {HIGH_COMPLEXITY:.0}"),
            cost: 1.0 + (complexity - HIGH_COMPLEXITY) / COMPLEXITY_FACTOR,
        });
    }
    if code_lines > LONG_MODULE_LINES {
        smells.push(Smell {
            id: "long-module".to_string(),
            message: format!("{code_lines} lines of code exceed {LONG_MODULE_LINES}"),
            cost: 2.0,
        });
    }
    if duplication >= 3.0 {
        smells.push(Smell {
            id: "duplicated-code".to_string(),
            message: format!("{duplication:.0} duplicated lines"),
            cost: 1.0,
        });
    }
    if churn > HIGH_CHURN {
        smells.push(Smell {
            id: "high-churn".to_string(),
            message: format!("changed in {churn} revisions"),
            cost: 1.0,
        });
    }
    smells
}
