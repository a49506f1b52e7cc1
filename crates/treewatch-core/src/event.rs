//! Event model.
//!
//! A WatchEvent is what survives routing: the kind of change, the
//! watched directory that reported it, and where the file lives.
//! Raw backend events never leave the watcher crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// The kind of change a handler can be bound to.
///
/// Directory creation and removal are deliberately absent. Only files
/// generate events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A file appeared.
    Add,
    /// A file's contents changed.
    Change,
    /// A file was removed.
    Unlink,
}

impl EventKind {
    /// All kinds, in the order they are usually reported.
    pub const ALL: [EventKind; 3] = [EventKind::Add, EventKind::Change, EventKind::Unlink];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Change => "change",
            EventKind::Unlink => "unlink",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(EventKind::Add),
            "change" => Ok(EventKind::Change),
            "unlink" => Ok(EventKind::Unlink),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

/// A routed file event.
///
/// `relative_path` is named after what callers historically asked for,
/// but it holds the absolute path of the directory containing the file,
/// not the file itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// What happened.
    pub kind: EventKind,

    /// The watched directory whose subscription reported the change.
    pub watched_dir: PathBuf,

    /// Last path segment of the file.
    pub filename: String,

    /// Absolute path of the containing directory.
    pub relative_path: PathBuf,
}

impl WatchEvent {
    /// Full path of the file this event is about.
    pub fn file_path(&self) -> PathBuf {
        self.relative_path.join(&self.filename)
    }
}

/// Everything the engine broadcasts to generic observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A file event that passed every filter.
    Event(WatchEvent),

    /// Non-fatal configuration problem, e.g. ignoring a missing directory.
    Warning { message: String },

    /// A handler returned an error. Dispatch carried on.
    HandlerFailed {
        event: WatchEvent,
        handler_dir: PathBuf,
        message: String,
    },

    /// A subscription hit a fatal backend error and was closed.
    SourceFailed { watched_dir: PathBuf, message: String },
}

impl Notification {
    /// The file event, if this notification carries one.
    pub fn event(&self) -> Option<&WatchEvent> {
        match self {
            Notification::Event(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_case_insensitively() {
        assert_eq!("ADD".parse::<EventKind>(), Ok(EventKind::Add));
        assert_eq!("change".parse::<EventKind>(), Ok(EventKind::Change));
        assert!("addDir".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_file_path_joins_containing_directory() {
        let event = WatchEvent {
            kind: EventKind::Change,
            watched_dir: PathBuf::from("/srv"),
            filename: "a.txt".into(),
            relative_path: PathBuf::from("/srv/docs"),
        };
        assert_eq!(event.file_path(), PathBuf::from("/srv/docs/a.txt"));
    }

    #[test]
    fn test_notification_serializes_with_type_tag() {
        let note = Notification::Warning {
            message: "careful".into(),
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["message"], "careful");
    }
}
