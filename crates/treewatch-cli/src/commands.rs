//! CLI command implementations.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;
use treewatch_core::config::CONFIG_DIR;
use treewatch_core::{EventKind, Notification, WatchConfig};
use treewatch_watcher::{capture_initial_files, SnapshotOptions, TreeWatcher};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Flags for `treewatch watch`, layered over the config file.
#[derive(Debug, Default)]
pub struct WatchOptions {
    pub dirs: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub ignored: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

impl WatchOptions {
    /// Non-empty flags replace the matching config entries.
    fn apply(&self, config: &mut WatchConfig) {
        if !self.dirs.is_empty() {
            config.monitored_directories = self.dirs.clone();
        }
        if !self.extensions.is_empty() {
            config.allowed_extensions = self.extensions.clone();
        }
        if !self.ignored.is_empty() {
            config.ignored_directories = self.ignored.clone();
        }
    }
}

/// Initialize Treewatch in a directory.
pub fn init(path: &Path) -> Result<()> {
    let config_path = WatchConfig::path_for(path);

    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    let default_config = WatchConfig {
        ignored_directories: vec![PathBuf::from(CONFIG_DIR)],
        ..Default::default()
    };
    default_config.save(&config_path)?;

    println!("{} Initialized Treewatch in {}", "✓".green(), path.display());
    println!("  Run {} to start watching", "treewatch watch".cyan());

    Ok(())
}

/// Snapshot a directory and report what watching would treat as pre-existing.
pub fn snapshot(path: &Path, follow_symlinks: bool) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message("Scanning files...");

    let start = Instant::now();
    let options = SnapshotOptions { follow_symlinks };
    let files = capture_initial_files([path], options)?;

    spinner.finish_and_clear();

    println!(
        "{} {} existing files under {} in {}ms",
        "✓".green(),
        files.len().to_string().cyan(),
        path.display(),
        start.elapsed().as_millis()
    );

    Ok(())
}

/// Watch until Ctrl+C, printing every notification.
pub async fn watch(base: &Path, options: WatchOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::load_or_default(base)?,
    };
    options.apply(&mut config);
    debug!("Effective config: {:?}", config);

    let mut watcher = TreeWatcher::from_config(base, &config)?;
    let mut notifications = watcher.subscribe();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message("Snapshotting...");

    let started = watcher.start_watching();
    spinner.finish_and_clear();
    started?;

    // Warnings raised while applying the config.
    for note in notifications.drain() {
        print_notification(&note, options.json)?;
    }

    println!(
        "{} Watching {} ({} existing files)",
        "✓".green(),
        watcher
            .watched_directories()
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
            .cyan(),
        watcher.initial_file_count()
    );
    println!("  Press {} to stop", "Ctrl+C".cyan());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tick.tick() => {
                watcher.dispatch_pending();
                for note in notifications.drain() {
                    print_notification(&note, options.json)?;
                }
            }
        }
    }

    watcher.stop_watching();
    println!("{} Stopped", "✓".green());

    Ok(())
}

fn print_notification(note: &Notification, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(note)?);
        return Ok(());
    }

    match note {
        Notification::Event(event) => {
            let kind = match event.kind {
                EventKind::Add => event.kind.to_string().green(),
                EventKind::Change => event.kind.to_string().yellow(),
                EventKind::Unlink => event.kind.to_string().red(),
            };
            println!(
                "{:>6} {} {}",
                kind,
                event.file_path().display(),
                format!("({})", event.watched_dir.display()).dimmed()
            );
        }
        Notification::Warning { message } => {
            eprintln!("{} {}", "⚠".yellow(), message);
        }
        Notification::HandlerFailed {
            event,
            handler_dir,
            message,
        } => {
            eprintln!(
                "{} handler on {} failed for {}: {}",
                "✗".red(),
                handler_dir.display(),
                event.file_path().display(),
                message
            );
        }
        Notification::SourceFailed {
            watched_dir,
            message,
        } => {
            eprintln!(
                "{} stopped watching {}: {}",
                "✗".red(),
                watched_dir.display(),
                message
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_replace_config_entries() {
        let mut config = WatchConfig {
            allowed_extensions: vec![".md".into()],
            ignored_directories: vec![PathBuf::from("target")],
            ..Default::default()
        };
        let options = WatchOptions {
            extensions: vec!["txt".into()],
            ..Default::default()
        };
        options.apply(&mut config);

        assert_eq!(config.allowed_extensions, vec!["txt".to_string()]);
        assert_eq!(config.ignored_directories, vec![PathBuf::from("target")]);
        assert!(config.monitored_directories.is_empty());
    }
}
