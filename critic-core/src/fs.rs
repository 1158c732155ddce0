//! Filesystem abstractions used for analysis.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Result;

/// Abstraction over filesystem access for testability.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem {
    /// List all files reachable from the root path. A file root yields itself.
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
    /// Read a file into a string.
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Whether the path exists at all.
    fn exists(&self, path: &Path) -> bool;
    /// Resolve symlinks to the final target.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new standard filesystem adapter.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if root.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }
        // The requested root must be readable; nested failures only skip their entry.
        std::fs::read_dir(root)?;

        let mut files = Vec::new();
        let mut visited = BTreeSet::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let key = std::fs::canonicalize(&dir).unwrap_or_else(|_| dir.clone());
            if !visited.insert(key) {
                debug!("skipping already visited directory {}", dir.display());
                continue;
            }
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("skipping unreadable directory {}: {err}", dir.display());
                    continue;
                }
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("skipping unreadable entry in {}: {err}", dir.display());
                        continue;
                    }
                };
                let path = entry.path();
                if is_hidden(&path) || is_build_output(&path) {
                    continue;
                }
                // Follows symlinks so linked files are listed; dedup happens upstream.
                let metadata = match std::fs::metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        warn!("skipping {}: {err}", path.display());
                        continue;
                    }
                };
                if metadata.is_dir() {
                    pending.push(path);
                } else if metadata.is_file() {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        Ok(std::fs::canonicalize(path)?)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.') && name != "." && name != "..")
        .unwrap_or(false)
}

fn is_build_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| matches!(name, "target" | "node_modules" | "tmp"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::StdFileSystem;
    use crate::fs::FileSystem;
    use std::path::PathBuf;

    #[test]
    fn std_filesystem_lists_and_reads_files() {
        let root = std::env::temp_dir().join(unique_dir_name());
        std::fs::create_dir_all(root.join("src")).expect("create temp dir");
        std::fs::create_dir_all(root.join(".git")).expect("create hidden dir");
        std::fs::create_dir_all(root.join("target")).expect("create target dir");
        let file_path = root.join("src").join("lib.rs");
        std::fs::write(&file_path, "pub fn critic() {}").expect("write test file");
        std::fs::write(root.join(".git").join("HEAD"), "ref").expect("write hidden file");
        std::fs::write(root.join("target").join("out.rs"), "fn x() {}").expect("write output");

        let fs = StdFileSystem::new();
        let files = fs.list_files(&root).expect("list files");
        assert_eq!(files, vec![file_path.clone()]);

        let contents = fs.read_to_string(&file_path).expect("read file");
        assert_eq!(contents, "pub fn critic() {}");

        std::fs::remove_dir_all(&root).expect("cleanup temp dir");
    }

    #[test]
    fn std_filesystem_lists_single_file_root() {
        let root = std::env::temp_dir().join(unique_dir_name());
        std::fs::create_dir_all(&root).expect("create temp dir");
        let file_path = root.join("main.rb");
        std::fs::write(&file_path, "puts 1").expect("write test file");

        let fs = StdFileSystem::new();
        assert_eq!(fs.list_files(&file_path).expect("list"), vec![file_path.clone()]);
        assert!(fs.exists(&file_path));
        assert!(!fs.exists(&root.join("missing.rb")));

        std::fs::remove_dir_all(&root).expect("cleanup temp dir");
    }

    #[cfg(unix)]
    #[test]
    fn std_filesystem_skips_dangling_links_and_directory_loops() {
        let root = std::env::temp_dir().join(unique_dir_name());
        let src = root.join("src");
        std::fs::create_dir_all(&src).expect("create temp dir");
        std::fs::write(src.join("a.rs"), "fn a() {}").expect("write a");
        std::fs::write(src.join("b.rs"), "fn b() {}").expect("write b");
        std::os::unix::fs::symlink(src.join("missing.rs"), src.join("dangling.rs"))
            .expect("dangling link");
        std::os::unix::fs::symlink(&src, src.join("again")).expect("loop link");

        let fs = StdFileSystem::new();
        let files = fs.list_files(&src).expect("list files");
        assert_eq!(files, vec![src.join("a.rs"), src.join("b.rs")]);

        std::fs::remove_dir_all(&root).expect("cleanup temp dir");
    }

    #[test]
    fn std_filesystem_fails_for_missing_root() {
        let root = std::env::temp_dir().join(unique_dir_name());
        assert!(StdFileSystem::new().list_files(&root).is_err());
    }

    static UNIQUE_COUNTER: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

    fn unique_dir_name() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let counter = UNIQUE_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        PathBuf::from(format!("critic_core_fs_test_{nanos}_{counter}"))
    }
}
