//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Midnight - autonomous software-build orchestrator
#[derive(Parser)]
#[command(
    name = "mn",
    about = "Autonomous build orchestrator with adversarial actor/sentinel agents",
    version,
    after_help = "Logs are written under the platform data directory (midnight/logs)."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon
    Start {
        /// Run in the foreground instead of forking
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop {
        /// Kill without waiting for the in-flight task
        #[arg(long)]
        force: bool,
    },

    /// Show daemon and queue status
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage the project queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Manage state snapshots
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Show the execution log
    Logs {
        /// Number of rows to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Check daemon liveness
    Health,

    /// Internal: run as the daemon process (used by `start`)
    #[command(hide = true)]
    RunDaemon,
}

/// Queue management subcommands
#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Add a project directory to the queue
    Add {
        /// Absolute path to the project
        path: PathBuf,

        /// Dispatch priority (higher runs first)
        #[arg(short, long, default_value = "0")]
        priority: i64,
    },

    /// List queued projects
    List,

    /// Remove a project and everything derived from it
    Remove {
        /// Project id
        id: String,
    },

    /// Change a project's priority
    Reorder {
        /// Project id
        id: String,

        /// New priority
        priority: i64,
    },
}

/// Snapshot management subcommands
#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// List snapshots for a project
    List {
        /// Project id
        project_id: String,
    },

    /// Take a snapshot of a project now
    Create {
        /// Project id
        project_id: String,
    },

    /// Run recovery over in-flight projects
    Recover {
        /// Recover from this snapshot id instead of the selected one
        #[arg(long)]
        force_snapshot: Option<String>,

        /// Leave working trees alone
        #[arg(long)]
        skip_git_reset: bool,

        /// Also reset failed tasks to pending
        #[arg(long)]
        clear_failed_tasks: bool,
    },
}

/// Output format for status output
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}
