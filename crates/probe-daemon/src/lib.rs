//! Probe daemon library exports.
//!
//! This crate provides the `probed` binary: a foreground scheduling loop
//! plus offline commands that edit the persisted scheduling state.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations
//! - `runner`: The event loop feeding alarms and completions into the engine
//! - `settings`: Layered configuration
//! - `worker`: TCP connect probes

pub mod cli;
pub mod commands;
pub mod runner;
pub mod settings;
pub mod worker;

pub use cli::{AdminCommands, Cli, Commands, IntervalCommands, SuspensionCommands, TaskCommands};
pub use commands::{
    handle_admin, handle_intervals, handle_suspension, handle_task, init_logging, load_settings,
    start_daemon,
};
pub use runner::Runner;
pub use settings::Settings;
pub use worker::{probe, ConnectWorker, WorkerDone};
