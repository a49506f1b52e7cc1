//! Error types for the watch engine.
//!
//! We keep errors simple and actionable. Each variant carries the
//! directory it concerns, so a failed startup tells you exactly which
//! tree to go and look at.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience type for functions that can fail while watching.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Error type user callbacks hand back to the router.
///
/// Anything boxed works here. The router never propagates it, it only
/// reports it on the notification channel.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Things that can go wrong while configuring or running a watcher.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Walking a monitored directory before watching failed.
    ///
    /// Startup is aborted when this happens: an incomplete initial set
    /// would make the router suppress (or surface) the wrong adds.
    #[error("failed to snapshot '{path}': {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The notification backend refused to watch a directory, or
    /// reported a fatal error for an existing subscription.
    #[error("notification source failed for '{path}': {message}")]
    Source { path: PathBuf, message: String },

    /// The configuration file exists but couldn't be understood.
    #[error("invalid configuration in '{path}': {message}")]
    Config { path: PathBuf, message: String },

    /// Plain filesystem failure outside of snapshotting.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WatchError {
    /// Creates a snapshot error with the directory for context.
    pub fn snapshot(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Snapshot {
            path: path.into(),
            source,
        }
    }

    /// Creates a source error from anything that displays.
    pub fn source(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Source {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates an IO error with the path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The directory or file this error is about.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Snapshot { path, .. }
            | Self::Source { path, .. }
            | Self::Config { path, .. }
            | Self::Io { path, .. } => path,
        }
    }
}
