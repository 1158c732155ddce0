//! Build numbering and output directory layout.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{CriticError, Result};

/// Default counter file name, placed in the system temp directory.
pub const DEFAULT_COUNTER_FILE: &str = "critic_build_count.txt";

/// The three output directories of a comparison run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDirectories {
    /// Full report of the base branch.
    pub base_dir: PathBuf,
    /// Full report of the feature branch.
    pub feature_dir: PathBuf,
    /// Filtered report of this build.
    pub build_dir: PathBuf,
}

/// Computes build numbers and output directories under a report root.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
    counter_file: PathBuf,
}

impl WorkspaceLayout {
    /// Create a layout rooted at `root` using `counter_file` for numbering.
    pub fn new(root: impl Into<PathBuf>, counter_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter_file: counter_file.into(),
        }
    }

    /// Default counter file location.
    pub fn default_counter_file() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_COUNTER_FILE)
    }

    /// Report root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read, increment and persist the build counter.
    ///
    /// An unreadable counter counts as zero and an unwritable one is only
    /// logged; numbering is best effort.
    pub fn next_build_number(&self) -> u64 {
        let current = match read_counter(&self.counter_file) {
            Ok(value) => value,
            Err(err) => {
                warn!("{err}; numbering from zero");
                0
            }
        };
        let next = current.saturating_add(1);
        if let Err(err) = write_counter(&self.counter_file, next) {
            warn!("{err}; build number {next} was not persisted");
        }
        next
    }

    /// Output directories for a build. Nothing is created on disk.
    pub fn directories_for(
        &self,
        build_number: u64,
        base_branch: &str,
        feature_branch: &str,
    ) -> BuildDirectories {
        BuildDirectories {
            base_dir: self.root.join(sanitize_branch(base_branch)),
            feature_dir: self.root.join(sanitize_branch(feature_branch)),
            build_dir: self
                .root
                .join("builds")
                .join(format!("build_{build_number}")),
        }
    }
}

fn read_counter(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let contents = std::fs::read_to_string(path).map_err(|err| {
        CriticError::Workspace(format!("cannot read counter {}: {err}", path.display()))
    })?;
    let first = contents.lines().next().unwrap_or("").trim();
    if first.is_empty() {
        return Ok(0);
    }
    first.parse::<u64>().map_err(|err| {
        CriticError::Workspace(format!("counter {} is not a number: {err}", path.display()))
    })
}

fn write_counter(path: &Path, value: u64) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format!("{value}\n")).map_err(|err| {
        CriticError::Workspace(format!("cannot write counter {}: {err}", path.display()))
    })
}

// Branch names like `feature/login` would otherwise nest directories.
fn sanitize_branch(branch: &str) -> String {
    branch
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}
