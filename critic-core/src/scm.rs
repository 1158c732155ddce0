//! Source control adapters and exclusive branch switching.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::error::{CriticError, Result};

/// Operations the engine needs from a version control system.
#[cfg_attr(test, mockall::automock)]
pub trait SourceControlSystem {
    /// Switch the working tree to `name`. Must succeed as a no-op when already there.
    fn switch_branch(&self, name: &str) -> Result<()>;
    /// Name of the branch currently checked out.
    fn current_branch(&self) -> Result<String>;
}

/// Revision history lookups used to compute churn.
pub trait ChurnSource {
    /// Number of revisions that touched `path`.
    fn revision_count(&self, path: &Path) -> Result<u32>;
}

/// Git adapter implemented with `git` commands.
#[derive(Debug, Clone)]
pub struct GitSourceControl {
    repo_dir: PathBuf,
}

impl GitSourceControl {
    /// Create an adapter operating on the repository at `repo_dir`.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    /// Repository working directory.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let status = run_git(
            &self.repo_dir,
            &["status", "--porcelain", "--untracked-files=no"],
        )?;
        Ok(!status.trim().is_empty())
    }
}

impl SourceControlSystem for GitSourceControl {
    fn switch_branch(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(CriticError::Switch("branch name is empty".to_string()));
        }
        let current = self.current_branch().map_err(as_switch_error)?;
        if current == name {
            debug!("already on {name}");
            return Ok(());
        }
        if self.has_uncommitted_changes().map_err(as_switch_error)? {
            return Err(CriticError::Switch(format!(
                "working tree has uncommitted changes; refusing to leave {current} for {name}"
            )));
        }
        run_git(&self.repo_dir, &["checkout", "--quiet", name]).map_err(as_switch_error)?;
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        let output = run_git(&self.repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = output.trim().to_string();
        if branch.is_empty() {
            return Err(CriticError::Other(
                "git rev-parse returned an empty branch name".to_string(),
            ));
        }
        Ok(branch)
    }
}

impl ChurnSource for GitSourceControl {
    fn revision_count(&self, path: &Path) -> Result<u32> {
        let path = path.to_string_lossy();
        let output = run_git(
            &self.repo_dir,
            &["log", "--oneline", "--follow", "--", path.as_ref()],
        )?;
        Ok(output.lines().filter(|line| !line.trim().is_empty()).count() as u32)
    }
}

/// Stand-in for trees without version control.
///
/// Reports a fixed branch name and only "switches" to that same name.
#[derive(Debug, Clone)]
pub struct NoSourceControl {
    branch: String,
}

impl NoSourceControl {
    /// Create a stand-in reporting `branch` as current.
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
        }
    }
}

impl Default for NoSourceControl {
    fn default() -> Self {
        Self::new("working-tree")
    }
}

impl SourceControlSystem for NoSourceControl {
    fn switch_branch(&self, name: &str) -> Result<()> {
        if name == self.branch {
            Ok(())
        } else {
            Err(CriticError::Switch(format!(
                "no version control detected; cannot switch to {name}"
            )))
        }
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.branch.clone())
    }
}

impl ChurnSource for NoSourceControl {
    fn revision_count(&self, _path: &Path) -> Result<u32> {
        Ok(0)
    }
}

/// Source control adapter picked for a directory.
pub enum DetectedSourceControl {
    /// A git work tree.
    Git(GitSourceControl),
    /// No version control.
    Untracked(NoSourceControl),
}

impl DetectedSourceControl {
    /// Borrow as the branch-switching capability.
    pub fn as_scs(&self) -> &dyn SourceControlSystem {
        match self {
            DetectedSourceControl::Git(git) => git,
            DetectedSourceControl::Untracked(none) => none,
        }
    }

    /// Borrow as the churn capability.
    pub fn as_churn(&self) -> &dyn ChurnSource {
        match self {
            DetectedSourceControl::Git(git) => git,
            DetectedSourceControl::Untracked(none) => none,
        }
    }
}

/// Pick git when `dir` is inside a git work tree.
pub fn detect_source_control(dir: &Path) -> DetectedSourceControl {
    let inside = run_git(dir, &["rev-parse", "--is-inside-work-tree"])
        .map(|output| output.trim() == "true")
        .unwrap_or(false);
    if inside {
        DetectedSourceControl::Git(GitSourceControl::new(dir))
    } else {
        DetectedSourceControl::Untracked(NoSourceControl::default())
    }
}

/// Serialises every switch of the shared working tree.
pub struct BranchSwitcher<'a> {
    scs: &'a dyn SourceControlSystem,
}

impl<'a> BranchSwitcher<'a> {
    /// Wrap a source control adapter.
    pub fn new(scs: &'a dyn SourceControlSystem) -> Self {
        Self { scs }
    }

    /// Switch the working tree, blocking until done.
    pub fn switch_to(&self, branch: &str) -> Result<()> {
        info!("switching working tree to {branch}");
        self.scs.switch_branch(branch)
    }

    /// Check out `base` and return a guard that returns the tree to `base` when dropped.
    ///
    /// When the first switch fails, the branch that was current beforehand is
    /// restored on a best-effort basis and the error is returned.
    pub fn checkout_base(&self, base: &str) -> Result<CheckoutGuard<'a>> {
        let original = match self.scs.current_branch() {
            Ok(branch) => Some(branch),
            Err(err) => {
                warn!("could not read current branch before switching: {err}");
                None
            }
        };
        if let Err(err) = self.switch_to(base) {
            if let Some(original) = original.filter(|original| original != base) {
                if let Err(restore) = self.scs.switch_branch(&original) {
                    warn!("could not restore {original}: {restore}");
                }
            }
            return Err(err);
        }
        Ok(CheckoutGuard {
            scs: self.scs,
            restore_to: base.to_string(),
            released: false,
        })
    }
}

/// Holds the working tree; switches back to the base branch on every exit path.
pub struct CheckoutGuard<'a> {
    scs: &'a dyn SourceControlSystem,
    restore_to: String,
    released: bool,
}

impl CheckoutGuard<'_> {
    /// Move the held tree to another branch.
    pub fn switch_to(&self, branch: &str) -> Result<()> {
        info!("switching working tree to {branch}");
        self.scs.switch_branch(branch)
    }

    /// Return the tree to the base branch, reporting a failed restore.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        info!("restoring working tree to {}", self.restore_to);
        self.scs.switch_branch(&self.restore_to)
    }
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "comparison interrupted; restoring working tree to {}",
            self.restore_to
        );
        if let Err(err) = self.scs.switch_branch(&self.restore_to) {
            warn!("could not restore {}: {err}", self.restore_to);
        }
    }
}

fn as_switch_error(err: CriticError) -> CriticError {
    match err {
        CriticError::Switch(_) => err,
        other => CriticError::Switch(other.to_string()),
    }
}

fn run_git(path: &Path, args: &[&str]) -> Result<String> {
    let mut command = Command::new("git");
    command.args(args).current_dir(path);
    command.env("GIT_TERMINAL_PROMPT", "0");
    let output = command
        .output()
        .map_err(|err| CriticError::Other(format!("git command failed: {err}")))?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !output.status.success() {
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(CriticError::Other(format!(
            "git {:?} failed: {}",
            args, detail
        )));
    }
    Ok(stdout)
}
