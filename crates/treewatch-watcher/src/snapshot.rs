//! Initial-state snapshotting.
//!
//! Walks a monitored directory once, before any subscription opens,
//! and records every regular file. The router uses the result to tell
//! a backend's startup "add" for an old file from a genuinely new one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use treewatch_core::{Result, WatchError};
use walkdir::WalkDir;

/// Options for directory snapshotting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions {
    /// Follow symbolic links when walking directories.
    pub follow_symlinks: bool,
}

/// Files known to exist before watching started.
#[derive(Debug, Clone, Default)]
pub struct InitialFiles {
    files: HashSet<PathBuf>,
}

impl InitialFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Recursively records every regular file under `directory`.
    ///
    /// Directories are traversed, not recorded. Any error, including a
    /// missing or unreadable root, aborts the walk: a partial snapshot
    /// is worse than none. Returns the number of files added.
    pub fn capture(&mut self, directory: &Path, options: SnapshotOptions) -> Result<usize> {
        let start = Instant::now();
        let mut captured = 0;

        let walker = WalkDir::new(directory).follow_links(options.follow_symlinks);

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| directory.to_path_buf());
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                WatchError::snapshot(path, source)
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            if self.files.insert(entry.into_path()) {
                captured += 1;
            }
        }

        debug!(
            "Snapshot of {} took {:?}",
            directory.display(),
            start.elapsed()
        );
        info!("Captured {} existing files under {}", captured, directory.display());

        Ok(captured)
    }
}

/// Snapshots several directories into one set, stopping at the first failure.
pub fn capture_initial_files<'a, I>(directories: I, options: SnapshotOptions) -> Result<InitialFiles>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut files = InitialFiles::new();
    for directory in directories {
        files.capture(directory, options)?;
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_capture_empty_directory() {
        let dir = tempdir().unwrap();
        let mut files = InitialFiles::new();
        let count = files.capture(dir.path(), SnapshotOptions::default()).unwrap();
        assert_eq!(count, 0);
        assert!(files.is_empty());
    }

    #[test]
    fn test_capture_records_nested_files_but_not_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), "x").unwrap();
        fs::write(dir.path().join("a/b/deep.md"), "y").unwrap();

        let files = capture_initial_files([dir.path()], SnapshotOptions::default()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.path().join("top.txt")));
        assert!(files.contains(&dir.path().join("a/b/deep.md")));
        assert!(!files.contains(&dir.path().join("a")));
    }

    #[test]
    fn test_missing_directory_fails_with_its_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = capture_initial_files([missing.as_path()], SnapshotOptions::default())
            .unwrap_err();
        match err {
            WatchError::Snapshot { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overlapping_directories_are_counted_once() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/f.txt"), "x").unwrap();

        let sub = dir.path().join("sub");
        let files =
            capture_initial_files([dir.path(), sub.as_path()], SnapshotOptions::default())
                .unwrap();
        assert_eq!(files.len(), 1);
    }

    /// Helper to create a directory symlink cross-platform.
    /// Returns None if symlink creation fails (e.g., no privileges on Windows).
    fn create_dir_symlink(original: &Path, link: &Path) -> Option<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(original, link).ok()
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::symlink_dir(original, link).ok()
        }
        #[cfg(not(any(unix, windows)))]
        {
            None
        }
    }

    #[test]
    fn test_symlinks_followed_only_when_enabled() {
        let dir = tempdir().unwrap();
        let linked_dir = tempdir().unwrap();
        fs::write(linked_dir.path().join("linked.txt"), "x").unwrap();

        if create_dir_symlink(linked_dir.path(), &dir.path().join("linked")).is_none() {
            return;
        }

        let plain = capture_initial_files([dir.path()], SnapshotOptions::default()).unwrap();
        assert_eq!(plain.len(), 0);

        let options = SnapshotOptions {
            follow_symlinks: true,
        };
        let followed = capture_initial_files([dir.path()], options).unwrap();
        assert_eq!(followed.len(), 1);
        assert!(followed.contains(&dir.path().join("linked/linked.txt")));
    }
}
