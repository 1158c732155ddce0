use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use critic_core::{
    AnalysedModule, Analyser, BranchPair, CompareConfig, CompareEngine, CriticError, FileReporter,
    ModuleCollection, ModuleStatus, NotificationStatus, Notifier, Phase, ReviewClient,
    SourceControlSystem,
};

/// Working tree double: remembers the checked-out branch and every switch.
#[derive(Clone)]
struct FakeTree {
    current: Rc<RefCell<String>>,
    branches: Vec<String>,
    switches: Rc<RefCell<Vec<String>>>,
}

impl FakeTree {
    fn new(current: &str, branches: &[&str]) -> Self {
        Self {
            current: Rc::new(RefCell::new(current.to_string())),
            branches: branches.iter().map(|branch| branch.to_string()).collect(),
            switches: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn current(&self) -> String {
        self.current.borrow().clone()
    }
}

impl SourceControlSystem for FakeTree {
    fn switch_branch(&self, name: &str) -> critic_core::Result<()> {
        if !self.branches.iter().any(|branch| branch == name) {
            return Err(CriticError::Switch(format!("unknown branch {name}")));
        }
        self.switches.borrow_mut().push(name.to_string());
        *self.current.borrow_mut() = name.to_string();
        Ok(())
    }

    fn current_branch(&self) -> critic_core::Result<String> {
        Ok(self.current())
    }
}

/// Returns the scripted collection for whichever branch the tree is on.
struct ScriptedAnalyser {
    tree: FakeTree,
    by_branch: BTreeMap<String, Vec<AnalysedModule>>,
}

impl Analyser for ScriptedAnalyser {
    fn run(&self, paths: &[PathBuf]) -> ModuleCollection {
        let modules = self
            .by_branch
            .get(&self.tree.current())
            .cloned()
            .unwrap_or_default();
        ModuleCollection::new(paths.to_vec(), modules)
    }
}

struct RecordingClient {
    notes: Rc<RefCell<Vec<(u64, String)>>>,
    fail: bool,
}

impl ReviewClient for RecordingClient {
    fn post_note(&self, request_id: u64, body: &str) -> critic_core::Result<()> {
        if self.fail {
            return Err(CriticError::Notification("github api error (502)".to_string()));
        }
        self.notes.borrow_mut().push((request_id, body.to_string()));
        Ok(())
    }
}

fn module(name: &str, cost: f64) -> AnalysedModule {
    AnalysedModule {
        name: name.to_string(),
        path: PathBuf::from(format!("lib/{name}.rb")),
        cost,
        complexity: cost,
        duplication: 0.0,
        churn: 1,
        methods_count: 1,
        smells: Vec::new(),
        status: ModuleStatus::Parsed,
    }
}

fn analyser(tree: &FakeTree, base: Vec<AnalysedModule>, feature: Vec<AnalysedModule>) -> ScriptedAnalyser {
    let mut by_branch = BTreeMap::new();
    by_branch.insert("main".to_string(), base);
    by_branch.insert("feature".to_string(), feature);
    ScriptedAnalyser {
        tree: tree.clone(),
        by_branch,
    }
}

fn config(root: &Path, branches: &str, threshold: f64) -> CompareConfig {
    let mut config = CompareConfig::new(branches.parse::<BranchPair>().expect("branches"));
    config.threshold = threshold;
    config.root = root.join("reports");
    config.counter_file = root.join("build_count.txt");
    config
}

#[test]
fn worked_scenario_reports_single_regression() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main", "feature"]);
    let analyser = analyser(
        &tree,
        vec![module("empty", 8.0), module("unparsable", 4.0)],
        vec![module("empty", 8.0), module("unparsable", 5.0)],
    );
    let config = config(&root, "main,feature", 0.0);
    let reporter = FileReporter::default();

    let outcome = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .run()
        .expect("comparison");

    assert_eq!(outcome.build_number, 1);
    assert_eq!(outcome.regression.regressed_count(), 1);
    assert!(outcome.regression.regressed.contains("unparsable"));
    assert_eq!(outcome.regression.rounded_delta(), 1.0);
    assert_eq!(outcome.base_total, 12.0);
    assert_eq!(outcome.feature_total, 13.0);
    assert!(outcome.verdict.pass);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.notification, NotificationStatus::NotRequested);
    assert_eq!(
        outcome.phases,
        vec![
            Phase::Init,
            Phase::BaseSwitched,
            Phase::BaseAnalysed,
            Phase::FeatureSwitched,
            Phase::FeatureAnalysed,
            Phase::Restored,
            Phase::Diffed,
            Phase::Reported,
            Phase::Notified,
            Phase::Gated,
            Phase::Done,
        ]
    );
    assert_eq!(tree.current(), "main");
    assert_eq!(*tree.switches.borrow(), vec!["main", "feature", "main"]);

    let dirs = &outcome.directories;
    assert!(dirs.base_dir.join("overview.md").is_file());
    assert!(dirs.feature_dir.join("overview.md").is_file());
    assert_eq!(outcome.report_location, dirs.build_dir.join("overview.md"));
    let build_index =
        std::fs::read_to_string(dirs.build_dir.join("code_index.md")).expect("build index");
    assert!(build_index.contains("| unparsable |"));
    assert!(!build_index.contains("| empty |"));
    let build_overview = std::fs::read_to_string(&outcome.report_location).expect("build overview");
    for label in ["Base branch report", "Feature branch report"] {
        let prefix = format!("- [{label}](file://");
        let line = build_overview
            .lines()
            .find(|line| line.starts_with(&prefix))
            .expect("report link");
        let linked = Path::new(line.trim_start_matches(&prefix).trim_end_matches(')'));
        assert!(linked.is_absolute());
        assert!(linked.is_file(), "{} does not resolve", linked.display());
    }

    let details = std::fs::read_to_string(dirs.build_dir.join("build_details.txt"))
        .expect("build details");
    assert!(details.starts_with("Base branch (main) score: "));
    assert!(details.contains("0 new module(s) added"));
    assert!(details.contains("1 module(s) regressed"));
    assert!(details.trim_end().ends_with("Quality degraded: 1 module(s) regressed (unparsable)"));

    cleanup_dir(&root);
}

#[test]
fn movement_beyond_threshold_fails_the_gate() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main", "feature"]);
    let analyser = analyser(
        &tree,
        vec![module("a", 10.0)],
        vec![module("a", 10.0), module("b", 6.25)],
    );
    let reporter = FileReporter::default();

    let strict = config(&root, "main,feature", 5.0);
    let outcome = CompareEngine::new(&strict, &tree, &analyser, &reporter)
        .run()
        .expect("comparison");
    assert!(!outcome.verdict.pass);
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.verdict.message.contains("10.00"));
    assert!(outcome.verdict.message.contains("16.25"));
    assert!(outcome.verdict.message.contains("delta 6.25"));
    assert!(outcome.regression.regressed.is_empty());
    assert_eq!(outcome.regression.new_modules.len(), 1);

    let relaxed = config(&root, "main,feature", 10.0);
    let outcome = CompareEngine::new(&relaxed, &tree, &analyser, &reporter)
        .run()
        .expect("comparison");
    assert!(outcome.verdict.pass);
    assert_eq!(outcome.build_number, 2);

    cleanup_dir(&root);
}

#[test]
fn failed_feature_switch_leaves_tree_on_base() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main"]);
    let analyser = analyser(&tree, vec![module("a", 1.0)], Vec::new());
    let config = config(&root, "main,feature", 0.0);
    let reporter = FileReporter::default();

    let failure = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .run()
        .expect_err("missing feature branch");

    assert_eq!(failure.phase, Phase::FeatureSwitched);
    assert!(failure.to_string().contains("unknown branch feature"));
    assert_eq!(tree.current(), "main");

    cleanup_dir(&root);
}

#[test]
fn failed_base_switch_restores_original_branch() {
    let root = temp_dir();
    let tree = FakeTree::new("topic", &["topic", "feature"]);
    let analyser = analyser(&tree, Vec::new(), Vec::new());
    let config = config(&root, "main,feature", 0.0);
    let reporter = FileReporter::default();

    let failure = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .run()
        .expect_err("missing base branch");

    assert_eq!(failure.phase, Phase::BaseSwitched);
    assert_eq!(tree.current(), "topic");

    cleanup_dir(&root);
}

#[test]
fn identical_runs_give_identical_verdicts() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main", "feature"]);
    let analyser = analyser(
        &tree,
        vec![module("x", 1.0), module("y", 9.0), module("gone", 4.0)],
        vec![module("x", 3.0), module("y", 2.0), module("added", 7.5)],
    );
    let config = config(&root, "main,feature", 3.0);
    let reporter = FileReporter::default();
    let engine = CompareEngine::new(&config, &tree, &analyser, &reporter);

    let first = engine.run().expect("first run");
    let second = engine.run().expect("second run");

    assert_eq!(first.verdict, second.verdict);
    assert_eq!(first.regression.regressed, second.regression.regressed);
    assert_eq!(second.build_number, first.build_number + 1);
    assert!(first.regression.regressed.contains("x"));
    assert_eq!(first.regression.removed_modules.len(), 1);

    cleanup_dir(&root);
}

#[test]
fn unparsable_modules_are_left_out_of_the_comparison() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main", "feature"]);
    let broken = AnalysedModule::unparsable(
        "broken".to_string(),
        PathBuf::from("lib/broken.rb"),
        "invalid UTF-8",
    );
    let analyser = analyser(
        &tree,
        vec![module("a", 2.0), module("broken", 3.0)],
        vec![module("a", 2.0), broken],
    );
    let config = config(&root, "main,feature", 0.0);
    let reporter = FileReporter::default();

    let outcome = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .run()
        .expect("comparison");

    assert!(outcome.regression.regressed.is_empty());
    assert!(outcome.regression.removed_modules.contains("broken"));
    assert_eq!(outcome.feature_total, 2.0);

    cleanup_dir(&root);
}

#[test]
fn review_request_receives_note() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main", "feature"]);
    let analyser = analyser(&tree, vec![module("a", 2.0)], vec![module("a", 4.0)]);
    let config = config(&root, "main,feature,17", 0.0);
    let reporter = FileReporter::default();
    let notes = Rc::new(RefCell::new(Vec::new()));
    let notifier = Notifier::new(Box::new(RecordingClient {
        notes: Rc::clone(&notes),
        fail: false,
    }));

    let outcome = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .with_notifier(Some(&notifier))
        .run()
        .expect("comparison");

    assert_eq!(outcome.notification, NotificationStatus::Sent);
    let notes = notes.borrow();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].0, 17);
    assert!(notes[0].1.contains("- `a`"));
    assert!(notes[0].1.contains("build_1"));

    cleanup_dir(&root);
}

#[test]
fn note_states_a_failed_gate() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main", "feature"]);
    let analyser = analyser(&tree, vec![module("a", 2.0)], vec![module("a", 40.0)]);
    let config = config(&root, "main,feature,17", 5.0);
    let reporter = FileReporter::default();
    let notes = Rc::new(RefCell::new(Vec::new()));
    let notifier = Notifier::new(Box::new(RecordingClient {
        notes: Rc::clone(&notes),
        fail: false,
    }));

    let outcome = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .with_notifier(Some(&notifier))
        .run()
        .expect("comparison");

    assert!(!outcome.verdict.pass);
    let notes = notes.borrow();
    assert!(notes[0].1.contains("**Quality gate failed:**"));
    assert!(notes[0].1.contains("delta 38.00 exceeds threshold 5.00"));

    cleanup_dir(&root);
}

#[test]
fn notification_failure_does_not_change_the_verdict() {
    let root = temp_dir();
    let tree = FakeTree::new("main", &["main", "feature"]);
    let analyser = analyser(&tree, vec![module("a", 2.0)], vec![module("a", 2.5)]);
    let config = config(&root, "main,feature,3", 1.0);
    let reporter = FileReporter::default();
    let notifier = Notifier::new(Box::new(RecordingClient {
        notes: Rc::new(RefCell::new(Vec::new())),
        fail: true,
    }));

    let outcome = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .with_notifier(Some(&notifier))
        .run()
        .expect("comparison");

    assert!(outcome.verdict.pass);
    assert!(matches!(outcome.notification, NotificationStatus::Failed(_)));
    let details = std::fs::read_to_string(outcome.details_file.expect("details file"))
        .expect("read details");
    assert!(details.contains("Notification: failed (notification failed: github api error (502))"));

    let skipped = CompareEngine::new(&config, &tree, &analyser, &reporter)
        .run()
        .expect("comparison without notifier");
    assert!(matches!(skipped.notification, NotificationStatus::Skipped(_)));
    assert_eq!(skipped.verdict.pass, outcome.verdict.pass);

    cleanup_dir(&root);
}

static UNIQUE_COUNTER: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn temp_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = UNIQUE_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    std::env::temp_dir().join(format!("critic_engine_it_{nanos}_{counter}"))
}

fn cleanup_dir(root: &Path) {
    std::fs::remove_dir_all(root).expect("cleanup temp dir");
}
