//! Filter sets consulted while events are routed.
//!
//! Both sets are replaced wholesale rather than edited in place. The
//! ignore set is read from backend threads, so it lives behind a lock
//! that only ever hands out complete snapshots.

use crate::paths::is_within;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Allowed file extensions. Empty means everything is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    allowed: BTreeSet<String>,
}

impl ExtensionFilter {
    /// Builds a filter from user-supplied extensions.
    ///
    /// Entries are lowercased and given a leading dot if they lack one,
    /// so `TXT`, `.txt` and `txt` are the same extension. Blank entries
    /// are dropped.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        Self { allowed }
    }

    /// Checks an extension as produced by [`crate::paths::extension`].
    pub fn allows(&self, extension: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(extension)
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        Some(lower)
    } else {
        Some(format!(".{}", lower))
    }
}

/// Directories whose contents never produce events.
///
/// Cloning shares the underlying set: a subscription's ignore predicate
/// holds a clone, and sees every later `replace` from the engine.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    current: Arc<RwLock<Arc<BTreeSet<PathBuf>>>>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set as it is right now. Later updates don't affect it.
    pub fn snapshot(&self) -> Arc<BTreeSet<PathBuf>> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Swaps in a whole new set in one step.
    pub fn replace(&self, dirs: BTreeSet<PathBuf>) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(dirs);
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Returns true if `candidate` is an ignored directory or lies under one.
    pub fn is_ignored(&self, candidate: &Path) -> bool {
        self.snapshot().iter().any(|dir| is_within(candidate, dir))
    }
}
