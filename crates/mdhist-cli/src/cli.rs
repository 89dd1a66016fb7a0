use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mdhist")]
#[command(about = "Local snapshot history for Markdown files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Workspace root (default: nearest directory with .git, .mdhist, Cargo.toml or package.json)
    #[arg(long, global = true, env = "MDHIST_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a snapshot as if the file had just been saved
    Save {
        file: PathBuf,
    },

    /// Create a labelled checkpoint
    Checkpoint {
        file: PathBuf,

        /// Checkpoint label (e.g. "Before major refactor")
        #[arg(long, short)]
        label: String,
    },

    /// List snapshots of a file, newest first
    List {
        file: PathBuf,
    },

    /// Print a snapshot's content
    View {
        file: PathBuf,

        /// Snapshot ID (YYYYMMDD-HHmmss-SSS)
        id: String,
    },

    /// Compare a snapshot with the current file
    Diff {
        file: PathBuf,

        /// Snapshot ID
        id: String,
    },

    /// Copy a snapshot's content to the clipboard
    Copy {
        file: PathBuf,

        /// Snapshot ID
        id: String,
    },

    /// Replace the file with a snapshot
    Restore {
        file: PathBuf,

        /// Snapshot ID
        id: String,

        /// Skip confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Apply the retention policy to the whole history
    Prune {
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Watch files and take snapshots as they change
    Watch {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Polling interval in milliseconds
        #[arg(long, default_value = "1000")]
        poll_ms: u64,
    },
}
