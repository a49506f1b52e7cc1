//! Treewatch Core - shared types for directory watching
//!
//! This crate holds the pieces every other Treewatch crate agrees on:
//! the event model, path resolution against a base directory, the
//! extension and ignore filters, the config file, and the error type.
//! It does no I/O beyond reading and writing the config.
//!
//! # Example
//!
//! ```
//! use treewatch_core::{paths, ExtensionFilter, PathResolver};
//!
//! let resolver = PathResolver::new("/srv/site").unwrap();
//! let file = resolver.resolve("docs/intro.MD");
//! let filter = ExtensionFilter::new(["md"]);
//!
//! assert!(filter.allows(&paths::extension(&file)));
//! assert_eq!(resolver.containing_dir(&file), resolver.resolve("docs"));
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod paths;

pub use config::WatchConfig;
pub use error::{HandlerError, Result, WatchError};
pub use event::{EventKind, Notification, WatchEvent};
pub use filter::{ExtensionFilter, IgnoreSet};
pub use paths::PathResolver;
