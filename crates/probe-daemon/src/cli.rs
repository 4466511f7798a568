//! CLI argument parsing for probed.
//!
//! `start` runs the scheduling loop in the foreground. Every other command
//! opens the database directly and must not run while the daemon holds it.

use clap::{Parser, Subcommand};
use probe_types::TimeOfDay;

/// Probe scheduler daemon
///
/// Runs periodic TCP reachability probes, honoring daily suspension windows.
#[derive(Parser, Debug)]
#[command(name = "probed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the default config location)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler in the foreground
    Start,

    /// Manage monitored tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Manage daily suspension intervals
    #[command(subcommand)]
    Intervals(IntervalCommands),

    /// Inspect or toggle suspension windows
    #[command(subcommand)]
    Suspension(SuspensionCommands),

    /// Administrative commands
    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommands {
    /// Create a task (disabled until enabled)
    Add {
        /// Display name
        name: String,

        /// Target host or address
        address: String,

        /// Target port
        port: u16,

        /// Seconds between runs
        #[arg(short, long, default_value = "300")]
        interval: u64,

        /// Request exact wake-ups
        #[arg(long)]
        high_priority: bool,

        /// Maximum concurrent executions
        #[arg(long, default_value = "1")]
        max_instances: u32,

        /// Enable right away
        #[arg(long)]
        enable: bool,
    },

    /// List all tasks
    List,

    /// Show one task
    Show { id: u64 },

    /// Enable a task
    Enable { id: u64 },

    /// Disable a task
    Disable { id: u64 },

    /// Edit a task's settings
    Edit {
        id: u64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(short, long)]
        interval: Option<u64>,

        #[arg(long)]
        high_priority: Option<bool>,

        #[arg(long)]
        max_instances: Option<u32>,
    },

    /// Delete a task
    Remove { id: u64 },
}

#[derive(Subcommand, Debug, Clone)]
pub enum IntervalCommands {
    /// Show raw intervals and which ones are in force
    List,

    /// Add an interval, e.g. `add 22:00 06:30`
    Add { start: TimeOfDay, end: TimeOfDay },

    /// Remove an interval by id
    Remove { id: u32 },

    /// Replace all intervals with the JSON list in a file
    Import { path: String },

    /// Print the raw interval list as JSON
    Export,

    /// Remove every interval
    Clear,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SuspensionCommands {
    /// Show whether a suspension window is active now
    Status,

    /// Honor suspension windows
    Enable,

    /// Ignore suspension windows
    Disable,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommands {
    /// Show database statistics
    Stats,

    /// Trigger RocksDB compaction
    Compact,
}
