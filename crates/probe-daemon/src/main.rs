//! Probe scheduler daemon
//!
//! Runs periodic TCP reachability probes, deferring runs that fall inside
//! daily suspension windows.
//!
//! # Usage
//!
//! ```bash
//! probed start
//! probed task add gateway 10.0.0.1 443 --interval 60 --enable
//! probed intervals add 22:00 06:30
//! probed suspension status
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/probed/config.toml)
//! 3. Environment variables (PROBED_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use probe_daemon::{
    handle_admin, handle_intervals, handle_suspension, handle_task, init_logging, load_settings,
    start_daemon, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(
        cli.config.as_deref(),
        cli.db_path.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Start => {
            start_daemon(settings).await?;
        }
        Commands::Task(cmd) => {
            handle_task(&settings, cmd)?;
        }
        Commands::Intervals(cmd) => {
            handle_intervals(&settings, cmd)?;
        }
        Commands::Suspension(cmd) => {
            handle_suspension(&settings, cmd)?;
        }
        Commands::Admin(cmd) => {
            handle_admin(&settings, cmd)?;
        }
    }

    Ok(())
}
