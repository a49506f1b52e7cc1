//! Event router.
//!
//! Takes one raw event at a time and decides what becomes of it:
//! extension filter, startup-add suppression, broadcast to generic
//! observers, then the nearest specific handler. Broadcast and handler
//! are independent: a surviving event always reaches both.

use crate::handlers::{Handler, HandlerTable};
use crate::observers::EventReceiver;
use crate::snapshot::InitialFiles;
use crate::source::RawEvent;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, error};
use treewatch_core::{paths, EventKind, ExtensionFilter, Notification, PathResolver, WatchEvent};

/// Why an event never reached observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Extension not in the allowed set.
    Extension,
    /// An add for a file that existed before watching started.
    InitialScan,
    /// Path is inside an ignored directory.
    Ignored,
    /// The reporting subscription has since been closed.
    Stale,
    /// A more specific watched directory reports this path too.
    Shadowed,
}

/// What happened to one raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Broadcast to observers; `handled` says whether a handler ran.
    Delivered { handled: bool },
    Dropped(DropReason),
    /// The message was a fatal source error and its subscription is gone.
    SourceFailed,
}

impl RouteOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, RouteOutcome::Delivered { .. })
    }
}

/// Filtering and dispatch state for one engine.
pub struct Router {
    resolver: PathResolver,
    extensions: ExtensionFilter,
    initial: InitialFiles,
    handlers: HandlerTable,
    observers: broadcast::Sender<Notification>,
}

impl Router {
    pub fn new(resolver: PathResolver, capacity: usize) -> Self {
        let (observers, _) = broadcast::channel(capacity.max(1));
        Self {
            resolver,
            extensions: ExtensionFilter::default(),
            initial: InitialFiles::new(),
            handlers: HandlerTable::new(),
            observers,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn extensions(&self) -> &ExtensionFilter {
        &self.extensions
    }

    pub fn set_extensions(&mut self, extensions: ExtensionFilter) {
        self.extensions = extensions;
    }

    pub fn initial_files(&self) -> &InitialFiles {
        &self.initial
    }

    pub fn set_initial_files(&mut self, initial: InitialFiles) {
        self.initial = initial;
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn set_handler(&mut self, dir: PathBuf, kind: EventKind, handler: Handler) -> bool {
        self.handlers.set(dir, kind, handler)
    }

    pub fn subscribe(&self, kind: Option<EventKind>) -> EventReceiver {
        EventReceiver::new(self.observers.subscribe(), kind)
    }

    /// Sends a notification to generic observers. Having none is fine.
    pub fn publish(&self, note: Notification) {
        let _ = self.observers.send(note);
    }

    /// Routes one raw event.
    pub fn route(&mut self, raw: &RawEvent) -> RouteOutcome {
        let filename = paths::file_name(&raw.path);
        let extension = paths::extension(&raw.path);
        let relative_path = self.resolver.containing_dir(&raw.path);

        if !self.extensions.allows(&extension) {
            debug!("Dropped {} {}: extension not allowed", raw.kind, raw.path.display());
            return RouteOutcome::Dropped(DropReason::Extension);
        }

        if raw.kind == EventKind::Add && self.initial.contains(&raw.path) {
            debug!("Dropped startup add for existing {}", raw.path.display());
            return RouteOutcome::Dropped(DropReason::InitialScan);
        }

        let event = WatchEvent {
            kind: raw.kind,
            watched_dir: raw.watched_dir.clone(),
            filename,
            relative_path,
        };

        self.publish(Notification::Event(event.clone()));

        let (handled, failure) = match self.handlers.find_mut(&raw.watched_dir, raw.kind) {
            Some((handler_dir, handler)) => {
                debug!("{} {} -> handler on {}", raw.kind, raw.path.display(), handler_dir.display());
                (true, handler(&event).err().map(|e| (handler_dir, e)))
            }
            None => (false, None),
        };

        if let Some((handler_dir, e)) = failure {
            error!(
                "Handler on {} failed for {} {}: {}",
                handler_dir.display(),
                event.kind,
                event.file_path().display(),
                e
            );
            self.publish(Notification::HandlerFailed {
                event,
                handler_dir,
                message: e.to_string(),
            });
        }

        RouteOutcome::Delivered { handled }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("base", &self.resolver.base())
            .field("extensions", &self.extensions)
            .field("initial_files", &self.initial.len())
            .field("handlers", &self.handlers)
            .finish()
    }
}
