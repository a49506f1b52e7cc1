//! Handler table.
//!
//! Maps directory → event kind → callback. Lookups walk upward from
//! the reporting directory, so a handler on `/a/b` wins over one on `/a`
//! for anything `/a/b` reports.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use treewatch_core::paths::parent_or_self;
use treewatch_core::{EventKind, HandlerError, WatchEvent};

/// A user callback bound to one directory and event kind.
pub type Handler = Box<dyn FnMut(&WatchEvent) -> Result<(), HandlerError> + Send>;

/// Registered handlers, at most one per (directory, kind).
#[derive(Default)]
pub struct HandlerTable {
    by_dir: HashMap<PathBuf, HashMap<EventKind, Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a handler, replacing any previous one for the same pair.
    ///
    /// Returns true if something was replaced.
    pub fn set(&mut self, dir: PathBuf, kind: EventKind, handler: Handler) -> bool {
        self.by_dir
            .entry(dir)
            .or_default()
            .insert(kind, handler)
            .is_some()
    }

    /// Directories with at least one handler.
    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.by_dir.keys().map(PathBuf::as_path)
    }

    /// Finds the nearest directory, starting at `dir` and walking up
    /// through its parents, that has a handler for `kind`.
    ///
    /// The walk ends at the root, whose parent is itself.
    pub fn resolve(&self, dir: &Path, kind: EventKind) -> Option<&Path> {
        let mut current = dir;
        loop {
            if let Some((found, _)) = self
                .by_dir
                .get_key_value(current)
                .filter(|(_, kinds)| kinds.contains_key(&kind))
            {
                return Some(found.as_path());
            }
            let parent = parent_or_self(current);
            if parent == current {
                return None;
            }
            current = parent;
        }
    }

    /// Like [`resolve`](Self::resolve), but hands back the callback too.
    pub fn find_mut(&mut self, dir: &Path, kind: EventKind) -> Option<(PathBuf, &mut Handler)> {
        let found = self.resolve(dir, kind)?.to_path_buf();
        let handler = self.by_dir.get_mut(&found)?.get_mut(&kind)?;
        Some((found, handler))
    }

    /// Number of registered (directory, kind) pairs.
    pub fn len(&self) -> usize {
        self.by_dir.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self
            .by_dir
            .iter()
            .flat_map(|(dir, kinds)| kinds.keys().map(move |kind| (dir, *kind)))
            .collect();
        entries.sort();
        f.debug_struct("HandlerTable").field("entries", &entries).finish()
    }
}
