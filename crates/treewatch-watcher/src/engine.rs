//! The watch engine.
//!
//! Ties the pieces together: configuration, snapshot-then-subscribe
//! startup, and the dispatch loop. Sources push raw messages onto one
//! channel; the caller drains it on its own thread with
//! [`TreeWatcher::dispatch_pending`] or [`TreeWatcher::dispatch_for`], so
//! events are processed one at a time and handlers never race.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use treewatch_core::EventKind;
//! use treewatch_watcher::TreeWatcher;
//!
//! let mut watcher = TreeWatcher::new("./site").unwrap();
//! watcher
//!     .set_allowed_extensions([".md"])
//!     .ignore_directory(["drafts"])
//!     .set_handler("posts", EventKind::Add, |event| {
//!         println!("new post {}", event.filename);
//!         Ok(())
//!     })
//!     .unwrap()
//!     .start_watching()
//!     .unwrap();
//!
//! loop {
//!     watcher.dispatch_for(Duration::from_millis(250));
//! }
//! ```

use crate::observers::EventReceiver;
use crate::registry::WatchRegistry;
use crate::router::{DropReason, RouteOutcome, Router};
use crate::snapshot::{capture_initial_files, SnapshotOptions};
use crate::source::{NotificationSource, NotifySource, RawEvent, RawMessage};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use treewatch_core::config::DEFAULT_CHANNEL_CAPACITY;
use treewatch_core::paths;
use treewatch_core::{
    EventKind, ExtensionFilter, HandlerError, IgnoreSet, Notification, PathResolver, Result,
    WatchConfig, WatchError, WatchEvent,
};

/// Watches directory trees and routes file events to handlers.
pub struct TreeWatcher {
    monitored: BTreeSet<PathBuf>,
    ignored: IgnoreSet,
    snapshot_options: SnapshotOptions,
    registry: WatchRegistry,
    router: Router,
    rx: Receiver<RawMessage>,
}

impl TreeWatcher {
    /// Creates a watcher backed by the platform notify backend.
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        Self::with_source(base, NotifySource::new())
    }

    /// Creates a watcher on top of any notification source.
    pub fn with_source(base: impl AsRef<Path>, source: impl NotificationSource + 'static) -> Result<Self> {
        Self::build(base.as_ref(), Box::new(source), DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a watcher from a config file's settings.
    ///
    /// A relative `base_dir` in the config is taken relative to `root`,
    /// the directory the config belongs to.
    pub fn from_config(root: &Path, config: &WatchConfig) -> Result<Self> {
        let base = match &config.base_dir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        let source = NotifySource::new()
            .emit_initial(config.emit_initial)
            .follow_symlinks(config.follow_symlinks);

        let mut watcher = Self::build(&base, Box::new(source), config.channel_capacity)?;
        watcher
            .set_follow_symlinks(config.follow_symlinks)
            .set_allowed_extensions(&config.allowed_extensions)
            .set_monitored_directories(&config.monitored_directories)
            .ignore_directory(&config.ignored_directories);
        Ok(watcher)
    }

    fn build(base: &Path, source: Box<dyn NotificationSource>, capacity: usize) -> Result<Self> {
        let resolver = PathResolver::new(base).map_err(|e| WatchError::io(base, e))?;
        let (tx, rx) = channel();
        let ignored = IgnoreSet::new();

        Ok(Self {
            monitored: BTreeSet::new(),
            registry: WatchRegistry::new(source, ignored.clone(), tx),
            ignored,
            snapshot_options: SnapshotOptions::default(),
            router: Router::new(resolver, capacity),
            rx,
        })
    }

    /// The absolute base directory.
    pub fn base_dir(&self) -> &Path {
        self.router.resolver().base()
    }

    /// Resolves a directory the same way every operation here does.
    pub fn resolve(&self, dir: impl AsRef<Path>) -> PathBuf {
        self.router.resolver().resolve(dir)
    }

    /// Replaces the allowed extensions. An empty list allows everything.
    pub fn set_allowed_extensions<I, S>(&mut self, extensions: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = ExtensionFilter::new(extensions);
        debug!("Allowed extensions: {:?}", filter.iter().collect::<Vec<_>>());
        self.router.set_extensions(filter);
        self
    }

    /// Replaces the directories snapshotted and watched on start.
    pub fn set_monitored_directories<I, P>(&mut self, dirs: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.monitored = dirs.into_iter().map(|dir| self.resolve(dir)).collect();
        self
    }

    /// Follow symlinks while snapshotting.
    pub fn set_follow_symlinks(&mut self, follow: bool) -> &mut Self {
        self.snapshot_options.follow_symlinks = follow;
        self
    }

    /// Adds directories to the ignore set.
    ///
    /// A directory that doesn't exist is still ignored, with a warning:
    /// it may well appear later.
    pub fn ignore_directory<I, P>(&mut self, dirs: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut next = (*self.ignored.snapshot()).clone();
        for dir in dirs {
            let dir = self.resolve(dir);
            if !dir.exists() {
                self.warn(format!(
                    "ignoring {} which does not exist (yet)",
                    dir.display()
                ));
            }
            next.insert(dir);
        }
        self.ignored.replace(next);
        self
    }

    /// Removes directories from the ignore set.
    pub fn unignore_directory<I, P>(&mut self, dirs: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut next = (*self.ignored.snapshot()).clone();
        for dir in dirs {
            let dir = self.resolve(dir);
            if !next.remove(&dir) {
                self.warn(format!("{} was not being ignored", dir.display()));
            }
        }
        self.ignored.replace(next);
        self
    }

    /// Extensions currently routed. Empty means all.
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.router.extensions().iter().map(str::to_string).collect()
    }

    /// Directories currently ignored.
    pub fn ignored_directories(&self) -> Vec<PathBuf> {
        self.ignored.snapshot().iter().cloned().collect()
    }

    /// Binds a handler to a directory and event kind.
    ///
    /// The directory starts being watched right away, even before
    /// [`start_watching`](Self::start_watching). A later registration for
    /// the same pair replaces this one.
    pub fn set_handler<P, F>(&mut self, dir: P, kind: EventKind, handler: F) -> Result<&mut Self>
    where
        P: AsRef<Path>,
        F: FnMut(&WatchEvent) -> std::result::Result<(), HandlerError> + Send + 'static,
    {
        let dir = self.resolve(dir);
        self.registry.watch_directory(&dir)?;
        if self.router.set_handler(dir.clone(), kind, Box::new(handler)) {
            debug!("Replaced {} handler on {}", kind, dir.display());
        }
        Ok(self)
    }

    /// Opens a subscription for `dir` if there isn't one already.
    pub fn watch_directory(&mut self, dir: impl AsRef<Path>) -> Result<&mut Self> {
        let dir = self.resolve(dir);
        self.registry.watch_directory(&dir)?;
        Ok(self)
    }

    /// Monitored directories, or the base directory if none were set.
    pub fn effective_directories(&self) -> Vec<PathBuf> {
        if self.monitored.is_empty() {
            vec![self.base_dir().to_path_buf()]
        } else {
            self.monitored.iter().cloned().collect()
        }
    }

    /// Snapshots every effective directory, then subscribes to each and
    /// to every directory that has a handler.
    ///
    /// Handler directories outside the effective ones are snapshotted
    /// too. All snapshots finish before the first subscription opens. If
    /// any snapshot fails nothing is subscribed and the error names the
    /// directory.
    pub fn start_watching(&mut self) -> Result<&mut Self> {
        let mut dirs = self.effective_directories();
        let mut handler_dirs: Vec<PathBuf> = self
            .router
            .handlers()
            .directories()
            .filter(|dir| !dirs.contains(&dir.to_path_buf()))
            .map(Path::to_path_buf)
            .collect();
        handler_dirs.sort();

        let uncovered = handler_dirs
            .iter()
            .filter(|dir| !dirs.iter().any(|root| paths::is_within(dir, root)));
        let snapshot_roots: Vec<&Path> = dirs.iter().chain(uncovered).map(PathBuf::as_path).collect();

        let initial = capture_initial_files(snapshot_roots.iter().copied(), self.snapshot_options)?;
        info!(
            "Snapshot complete: {} files across {} directories",
            initial.len(),
            snapshot_roots.len()
        );
        self.router.set_initial_files(initial);

        dirs.extend(handler_dirs);
        for dir in &dirs {
            self.registry.watch_directory(dir)?;
        }
        Ok(self)
    }

    /// Closes every subscription.
    ///
    /// Handlers, filters and monitored directories are kept, so watching
    /// can be started again. Nothing queued before this call is delivered
    /// afterwards.
    pub fn stop_watching(&mut self) -> &mut Self {
        let closed = self.registry.stop_all();
        let discarded = self.rx.try_iter().count();
        if closed > 0 {
            info!("Stopped {} subscriptions ({} pending events discarded)", closed, discarded);
        }
        self
    }

    /// Receives every notification: events, warnings and failures.
    pub fn subscribe(&self) -> EventReceiver {
        self.router.subscribe(None)
    }

    /// Receives only events of one kind.
    pub fn subscribe_kind(&self, kind: EventKind) -> EventReceiver {
        self.router.subscribe(Some(kind))
    }

    pub fn is_watching(&self, dir: impl AsRef<Path>) -> bool {
        self.registry.is_watching(&self.resolve(dir))
    }

    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.registry.watched_dirs().map(Path::to_path_buf).collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Files recorded by the last snapshot.
    pub fn initial_file_count(&self) -> usize {
        self.router.initial_files().len()
    }

    /// Processes everything already queued. Returns how many events were
    /// delivered.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(message) = self.rx.try_recv() {
            if self.dispatch(message).is_delivered() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Waits up to `timeout` for one message and processes it.
    ///
    /// Returns None if nothing arrived in time.
    pub fn dispatch_next(&mut self, timeout: Duration) -> Option<RouteOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(self.dispatch(message)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Keeps processing messages until `duration` has passed. Returns how
    /// many events were delivered.
    pub fn dispatch_for(&mut self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut delivered = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return delivered + self.dispatch_pending();
            }
            match self.dispatch_next(remaining) {
                Some(outcome) if outcome.is_delivered() => delivered += 1,
                Some(_) => {}
                None => return delivered,
            }
        }
    }

    fn dispatch(&mut self, message: RawMessage) -> RouteOutcome {
        match message {
            RawMessage::Event(raw) => self.dispatch_event(&raw),
            RawMessage::Failed {
                subscription,
                watched_dir,
                message,
            } => {
                if self.registry.close(subscription).is_some() {
                    error!("Subscription for {} failed: {}", watched_dir.display(), message);
                    self.router.publish(Notification::SourceFailed {
                        watched_dir,
                        message,
                    });
                }
                RouteOutcome::SourceFailed
            }
        }
    }

    fn dispatch_event(&mut self, raw: &RawEvent) -> RouteOutcome {
        if !self.registry.is_active(raw.subscription) {
            debug!("Dropped {} {}: subscription closed", raw.kind, raw.path.display());
            return RouteOutcome::Dropped(DropReason::Stale);
        }

        // Queued before an ignore call took effect.
        if self.ignored.is_ignored(&raw.path) {
            return RouteOutcome::Dropped(DropReason::Ignored);
        }

        if let Some(deeper) = self.registry.shadowing(raw) {
            debug!(
                "Dropped {} {}: reported by {}",
                raw.kind,
                raw.path.display(),
                deeper.display()
            );
            return RouteOutcome::Dropped(DropReason::Shadowed);
        }

        self.router.route(raw)
    }

    fn warn(&self, message: String) {
        warn!("{}", message);
        self.router.publish(Notification::Warning { message });
    }
}

impl std::fmt::Debug for TreeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWatcher")
            .field("monitored", &self.monitored)
            .field("ignored", &self.ignored.snapshot())
            .field("registry", &self.registry)
            .field("router", &self.router)
            .finish()
    }
}

impl Drop for TreeWatcher {
    fn drop(&mut self) {
        self.registry.stop_all();
    }
}
