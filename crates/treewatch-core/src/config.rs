//! On-disk configuration.
//!
//! Lives at `.treewatch/config.json` next to the tree being watched.
//! Every field has a default, so an empty object is a valid config.

use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding the config file, relative to the project root.
pub const CONFIG_DIR: &str = ".treewatch";

/// File name of the config inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.json";

/// Broadcast buffer used when the config doesn't say otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Settings applied to a watcher before it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Base directory that relative paths resolve against.
    /// Defaults to the directory the config was found in.
    pub base_dir: Option<PathBuf>,

    /// Directories snapshotted and watched on start. Empty means the base.
    pub monitored_directories: Vec<PathBuf>,

    /// Extensions to route (`.txt`, `md`, ...). Empty means all.
    pub allowed_extensions: Vec<String>,

    /// Directories whose events are dropped at the source.
    pub ignored_directories: Vec<PathBuf>,

    /// Follow symbolic links while snapshotting.
    pub follow_symlinks: bool,

    /// Have the notify backend report pre-existing files as adds when a
    /// subscription opens. The router suppresses the ones it snapshotted.
    pub emit_initial: bool,

    /// Buffer size of the broadcast channel for generic observers.
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            monitored_directories: Vec::new(),
            allowed_extensions: Vec::new(),
            ignored_directories: Vec::new(),
            follow_symlinks: false,
            emit_initial: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WatchConfig {
    /// Where the config for `root` lives.
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| WatchError::io(path, e))?;
        debug!("Loading config from {}", path.display());
        serde_json::from_str(&content).map_err(|e| WatchError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Reads the config for `root` if there is one, otherwise the defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = Self::path_for(root);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WatchError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| WatchError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| WatchError::io(path, e))
    }
}
