//! Treewatch Watcher - directory-scoped event routing
//!
//! This crate is the engine behind Treewatch:
//! - Snapshotting monitored trees before watching, so startup noise
//!   can be told apart from real additions
//! - One subscription per watched directory, with ignored directories
//!   filtered out at the source
//! - Routing each surviving event to generic observers and to the
//!   nearest registered handler
//!
//! The OS notification backend sits behind [`NotificationSource`]; the
//! default is [`NotifySource`], built on the notify crate.

mod engine;
mod handlers;
mod observers;
mod registry;
mod router;
mod snapshot;
mod source;

pub use engine::TreeWatcher;
pub use handlers::{Handler, HandlerTable};
pub use observers::EventReceiver;
pub use registry::WatchRegistry;
pub use router::{DropReason, RouteOutcome, Router};
pub use snapshot::{capture_initial_files, InitialFiles, SnapshotOptions};
pub use source::{
    classify, EventSink, IgnorePredicate, NotificationSource, NotifySource, RawEvent, RawMessage,
    SourceHandle, SubscriptionId,
};
