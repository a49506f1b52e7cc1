//! Watch registry.
//!
//! Owns at most one subscription per watched directory. Every
//! subscription gets the same ignore predicate, backed by the engine's
//! shared [`IgnoreSet`], so later ignore/unignore calls apply to
//! subscriptions that are already open.

use crate::source::{
    EventSink, IgnorePredicate, NotificationSource, RawEvent, RawMessage, SourceHandle, SubscriptionId,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, info};
use treewatch_core::{IgnoreSet, Result};

struct Subscription {
    id: SubscriptionId,
    handle: Box<dyn SourceHandle>,
}

/// Active subscriptions keyed by absolute directory.
pub struct WatchRegistry {
    source: Box<dyn NotificationSource>,
    ignored: IgnoreSet,
    tx: Sender<RawMessage>,
    subscriptions: BTreeMap<PathBuf, Subscription>,
    next_id: SubscriptionId,
    last_opened: Arc<AtomicU64>,
}

impl WatchRegistry {
    pub fn new(source: Box<dyn NotificationSource>, ignored: IgnoreSet, tx: Sender<RawMessage>) -> Self {
        Self {
            source,
            ignored,
            tx,
            subscriptions: BTreeMap::new(),
            next_id: 1,
            last_opened: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Opens a subscription for `dir` unless one already exists.
    ///
    /// Returns true if a new subscription was created.
    pub fn watch_directory(&mut self, dir: &Path) -> Result<bool> {
        if self.subscriptions.contains_key(dir) {
            debug!("Already watching {}", dir.display());
            return Ok(false);
        }

        let id = self.next_id;
        self.next_id += 1;

        let ignored = self.ignored.clone();
        let predicate: IgnorePredicate = Arc::new(move |candidate: &Path| ignored.is_ignored(candidate));
        let sink = EventSink::new(id, dir.to_path_buf(), self.tx.clone(), Arc::clone(&self.last_opened));

        let handle = self.source.subscribe(dir, predicate, sink)?;
        self.subscriptions
            .insert(dir.to_path_buf(), Subscription { id, handle });
        // Events stamped from here on may also have been seen by `dir`.
        self.last_opened.store(id, Ordering::SeqCst);

        info!("Subscription {} opened for {}", id, dir.display());
        Ok(true)
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.subscriptions.contains_key(dir)
    }

    /// True while the subscription with this id is still registered.
    pub fn is_active(&self, id: SubscriptionId) -> bool {
        self.subscriptions.values().any(|sub| sub.id == id)
    }

    /// A watched directory below `raw.watched_dir` that also covers
    /// `raw.path` and was already open when the event was sent.
    ///
    /// Such a directory reported the same change itself, so this copy
    /// is a duplicate. Subscriptions opened later never saw it.
    pub fn shadowing(&self, raw: &RawEvent) -> Option<&Path> {
        raw.path
            .ancestors()
            .skip(1)
            .take_while(|dir| *dir != raw.watched_dir)
            .find_map(|dir| {
                self.subscriptions
                    .get_key_value(dir)
                    .filter(|(_, sub)| sub.id <= raw.opened_before)
            })
            .map(|(dir, _)| dir.as_path())
    }

    /// Closes and forgets one subscription. Returns its directory.
    pub fn close(&mut self, id: SubscriptionId) -> Option<PathBuf> {
        let dir = self
            .subscriptions
            .iter()
            .find(|(_, sub)| sub.id == id)
            .map(|(dir, _)| dir.clone())?;

        if let Some(mut sub) = self.subscriptions.remove(&dir) {
            sub.handle.close();
            info!("Subscription {} closed for {}", id, dir.display());
        }
        Some(dir)
    }

    /// Closes every subscription. Safe to call when nothing is open.
    pub fn stop_all(&mut self) -> usize {
        let closed = self.subscriptions.len();
        for (dir, mut sub) in std::mem::take(&mut self.subscriptions) {
            sub.handle.close();
            debug!("Subscription {} closed for {}", sub.id, dir.display());
        }
        closed
    }

    pub fn watched_dirs(&self) -> impl Iterator<Item = &Path> {
        self.subscriptions.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("watched", &self.subscriptions.keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id)
            .finish()
    }
}
