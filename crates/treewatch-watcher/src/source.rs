//! Notification sources.
//!
//! A source turns OS-level change notifications for one root into raw
//! add/change/unlink messages on the engine's channel. The default one
//! uses the notify crate. Anything else (tests, remote mirrors) only has
//! to implement [`NotificationSource`].

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, info, warn};
use treewatch_core::{EventKind, Result, WatchError};
use walkdir::WalkDir;

/// Identifies one subscription for its whole lifetime.
pub type SubscriptionId = u64;

/// Decides whether a candidate path is dropped before it is forwarded.
pub type IgnorePredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// A change as reported by a source, before any routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub subscription: SubscriptionId,
    /// Newest subscription that had finished opening when this was sent.
    pub opened_before: SubscriptionId,
    pub kind: EventKind,
    pub watched_dir: PathBuf,
    pub path: PathBuf,
}

/// What travels over the engine's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    Event(RawEvent),
    /// The source can't continue for this subscription.
    Failed {
        subscription: SubscriptionId,
        watched_dir: PathBuf,
        message: String,
    },
}

/// Where a subscription delivers its messages.
///
/// Cheap to clone, and safe to move into backend callback threads.
#[derive(Debug, Clone)]
pub struct EventSink {
    subscription: SubscriptionId,
    watched_dir: PathBuf,
    tx: Sender<RawMessage>,
    last_opened: Arc<AtomicU64>,
}

impl EventSink {
    pub(crate) fn new(
        subscription: SubscriptionId,
        watched_dir: PathBuf,
        tx: Sender<RawMessage>,
        last_opened: Arc<AtomicU64>,
    ) -> Self {
        Self {
            subscription,
            watched_dir,
            tx,
            last_opened,
        }
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    pub fn watched_dir(&self) -> &Path {
        &self.watched_dir
    }

    /// Forwards one change. Returns false once the engine is gone.
    pub fn send(&self, kind: EventKind, path: PathBuf) -> bool {
        self.tx
            .send(RawMessage::Event(RawEvent {
                subscription: self.subscription,
                opened_before: self.last_opened.load(Ordering::SeqCst),
                kind,
                watched_dir: self.watched_dir.clone(),
                path,
            }))
            .is_ok()
    }

    /// Reports a fatal error for this subscription.
    pub fn fail(&self, message: impl ToString) -> bool {
        self.tx
            .send(RawMessage::Failed {
                subscription: self.subscription,
                watched_dir: self.watched_dir.clone(),
                message: message.to_string(),
            })
            .is_ok()
    }
}

/// A live subscription held by the registry.
pub trait SourceHandle: Send {
    /// Stops all further delivery. Must be idempotent.
    fn close(&mut self);
}

/// Produces raw events for a directory subtree.
pub trait NotificationSource: Send {
    /// Starts watching `root` recursively.
    ///
    /// Paths for which `ignore` returns true must never reach `sink`.
    fn subscribe(
        &mut self,
        root: &Path,
        ignore: IgnorePredicate,
        sink: EventSink,
    ) -> Result<Box<dyn SourceHandle>>;
}

/// Source backed by the platform's recommended notify watcher.
#[derive(Debug, Clone, Copy)]
pub struct NotifySource {
    emit_initial: bool,
    follow_symlinks: bool,
}

impl Default for NotifySource {
    fn default() -> Self {
        Self {
            emit_initial: true,
            follow_symlinks: false,
        }
    }
}

impl NotifySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every file already under the root as an add once the
    /// watch is live. On by default.
    pub fn emit_initial(mut self, emit: bool) -> Self {
        self.emit_initial = emit;
        self
    }

    /// Follow symlinks while enumerating pre-existing files.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

impl NotificationSource for NotifySource {
    fn subscribe(
        &mut self,
        root: &Path,
        ignore: IgnorePredicate,
        sink: EventSink,
    ) -> Result<Box<dyn SourceHandle>> {
        let handler_sink = sink.clone();
        let handler_ignore = Arc::clone(&ignore);
        let handler_root = root.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for (kind, path) in classify(&event) {
                    if handler_ignore(&path) {
                        debug!("Ignored {} {}", kind, path.display());
                        continue;
                    }
                    if !handler_sink.send(kind, path) {
                        warn!("Failed to send file change event");
                    }
                }
            }
            Err(e) if is_fatal(&e, &handler_root) => {
                warn!("Watch of {} failed: {}", handler_root.display(), e);
                handler_sink.fail(e);
            }
            Err(e) => warn!("Watch error: {}", e),
        })
        .map_err(|e| WatchError::source(root, e))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::source(root, e))?;

        info!("Watching {} for changes", root.display());

        if self.emit_initial {
            let reported = report_existing(root, &ignore, &sink, self.follow_symlinks);
            debug!("Reported {} existing files under {}", reported, root.display());
        }

        Ok(Box::new(NotifyHandle {
            root: root.to_path_buf(),
            watcher: Some(watcher),
        }))
    }
}

/// Sends an add for every non-ignored file under `root`.
///
/// Unreadable entries are skipped: this is a courtesy replay, not the
/// snapshot the router relies on.
fn report_existing(root: &Path, ignore: &IgnorePredicate, sink: &EventSink, follow_links: bool) -> usize {
    let mut reported = 0;
    let walker = WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_entry(|entry| !ignore(entry.path()));

    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if !sink.send(EventKind::Add, entry.into_path()) {
            break;
        }
        reported += 1;
    }
    reported
}

struct NotifyHandle {
    root: PathBuf,
    watcher: Option<notify::RecommendedWatcher>,
}

impl SourceHandle for NotifyHandle {
    fn close(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.root) {
                debug!("Unwatch of {} failed: {}", self.root.display(), e);
            }
            info!("Stopped watching {}", self.root.display());
        }
    }
}

impl Drop for NotifyHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Whether a backend error ends the subscription.
///
/// Running out of watches or losing the root does. Errors about a single
/// path inside the tree are only logged.
fn is_fatal(error: &notify::Error, root: &Path) -> bool {
    matches!(error.kind, notify::ErrorKind::MaxFilesWatch) || !root.exists()
}

/// Maps a notify event onto file-level add/change/unlink pairs.
///
/// Directory creation and removal, access and metadata-only changes
/// produce nothing. Renames become an unlink of the old name and an add
/// of the new one, taken from the `From` and `To` halves. The paired
/// `Both` event that inotify sends afterwards repeats them and is skipped.
pub fn classify(event: &Event) -> Vec<(EventKind, PathBuf)> {
    let every = |kind: EventKind| -> Vec<(EventKind, PathBuf)> {
        event.paths.iter().map(|path| (kind, path.clone())).collect()
    };

    match &event.kind {
        notify::EventKind::Create(CreateKind::Folder) => Vec::new(),
        notify::EventKind::Create(CreateKind::File) => every(EventKind::Add),
        notify::EventKind::Create(_) => files_only(every(EventKind::Add)),

        notify::EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => every(EventKind::Unlink),
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            files_only(every(EventKind::Add))
        }
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => Vec::new(),
        // Backends that can't pair renames: decide by whether the path is still there.
        notify::EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter(|path| !path.is_dir())
            .map(|path| {
                let kind = if path.exists() {
                    EventKind::Add
                } else {
                    EventKind::Unlink
                };
                (kind, path.clone())
            })
            .collect(),
        notify::EventKind::Modify(_) => files_only(every(EventKind::Change)),

        notify::EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        notify::EventKind::Remove(_) => every(EventKind::Unlink),

        _ => Vec::new(),
    }
}

fn files_only(changes: Vec<(EventKind, PathBuf)>) -> Vec<(EventKind, PathBuf)> {
    changes.into_iter().filter(|(_, path)| !path.is_dir()).collect()
}
