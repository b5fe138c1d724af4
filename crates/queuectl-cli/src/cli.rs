//! CLI command definitions and subcommands

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use queuectl_core::TaskState;

/// queuectl - persistent job queue with retries and a dead-letter queue
#[derive(Parser)]
#[command(
    name = "queuectl",
    about = "Persistent job queue with exponential-backoff retries and a dead-letter queue",
    version
)]
pub struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true, default_value = "queuectl.db")]
    pub db: PathBuf,

    /// Path to config file (default: config.json next to the database)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => path.clone(),
            None => sibling(&self.db, "config.json"),
        }
    }
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Add a new job, e.g. '{"command":"sleep 2"}'
    Enqueue {
        /// Job JSON: `command` (required), `id` and `max_retries` (optional)
        job_json: String,
    },

    /// Manage workers
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },

    /// Show job counts per state
    Status,

    /// List jobs in one state
    List {
        /// pending, running, completed, failed or dead
        #[arg(long)]
        state: TaskState,
    },

    /// View or retry dead-letter jobs
    Dlq {
        #[command(subcommand)]
        command: DlqCommand,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Run workers in the foreground until Ctrl+C or `worker stop`
    Start {
        /// Number of workers
        #[arg(long, default_value_t = 1)]
        count: usize,
    },

    /// Ask running workers to stop after their current job
    Stop,
}

#[derive(Subcommand)]
pub enum DlqCommand {
    /// List dead jobs
    List,

    /// Re-enqueue a dead job as a new job with zero attempts
    Retry { job_id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print current configuration
    Show,

    /// Set a configuration key
    Set { key: String, value: String },
}

/// Marker file used by `worker stop` to reach a `worker start` process.
pub fn stop_marker_path(db: &Path) -> PathBuf {
    let mut name: OsString = db.as_os_str().to_owned();
    name.push(".stop");
    PathBuf::from(name)
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file_name),
        _ => PathBuf::from(file_name),
    }
}
