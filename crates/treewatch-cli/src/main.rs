//! Treewatch CLI - Command-line interface for Treewatch
//!
//! This is the main entry point for users interacting with Treewatch.
//! It provides commands for setting up a config, snapshotting a tree,
//! and watching it for changes.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "treewatch")]
#[command(author = "Treewatch Contributors")]
#[command(version)]
#[command(about = "Watch directory trees and route file events", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config to .treewatch/config.json
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Count the files that exist right now, as watching would see them
    Snapshot {
        /// Path to snapshot (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// Watch directories and print every event until Ctrl+C
    Watch {
        /// Directories to monitor (defaults to the config, then the base)
        dirs: Vec<PathBuf>,

        /// Base directory that relative paths resolve against
        #[arg(short, long, default_value = ".")]
        base: PathBuf,

        /// Only report files with this extension (repeatable)
        #[arg(short, long = "ext")]
        extensions: Vec<String>,

        /// Directory to ignore (repeatable)
        #[arg(short, long = "ignore")]
        ignored: Vec<PathBuf>,

        /// Config file to use instead of <base>/.treewatch/config.json
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Snapshot {
            path,
            follow_symlinks,
        } => commands::snapshot(&path, follow_symlinks),
        Commands::Watch {
            dirs,
            base,
            extensions,
            ignored,
            config,
            json,
        } => {
            let options = commands::WatchOptions {
                dirs,
                extensions,
                ignored,
                config,
                json,
            };
            commands::watch(&base, options).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
