//! Command implementations for probed.
//!
//! Handles:
//! - start: load config, open storage, run the scheduler loop
//! - task / intervals / suspension: edit persisted scheduling state
//! - admin: storage statistics and compaction

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use probe_scheduler::{
    JitterConfig, NewTask, RescheduleEngine, SchedulerError, SystemClock, TaskEdit, TaskEvent,
    TokioAlarms,
};
use probe_storage::Storage;
use probe_types::{Interval, Task, TaskId, TaskState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{AdminCommands, IntervalCommands, SuspensionCommands, TaskCommands};
use crate::runner::Runner;
use crate::settings::Settings;
use crate::worker::ConnectWorker;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    settings
        .scheduler
        .validate()
        .context("Invalid scheduler configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let storage = Storage::open(&db_path)
        .with_context(|| format!("Failed to open storage at {:?}", db_path))?;
    Ok(Arc::new(storage))
}

fn open_engine(settings: &Settings) -> Result<RescheduleEngine<Storage>> {
    let storage = open_storage(settings)?;
    RescheduleEngine::new(storage, settings.scheduler.clone())
        .context("Failed to initialize scheduler")
}

/// Run the scheduler in the foreground until Ctrl+C or SIGTERM.
pub async fn start_daemon(settings: Settings) -> Result<()> {
    info!("Probe daemon starting...");
    info!("Configuration:");
    info!("  Database path: {}", settings.db_path);
    info!("  Timezone: {}", settings.scheduler.timezone);
    info!("  Probe timeout: {}s", settings.probe_timeout_secs);
    info!("  Log level: {}", settings.log_level);

    let engine = Arc::new(open_engine(&settings)?);
    let shutdown = CancellationToken::new();

    let runner = Runner::new(
        Arc::clone(&engine),
        Arc::new(SystemClock),
        TokioAlarms::new(
            JitterConfig::new(settings.scheduler.inexact_jitter_secs),
            shutdown.clone(),
        ),
        ConnectWorker::new(
            Duration::from_secs(settings.probe_timeout_secs),
            shutdown.clone(),
        ),
        Duration::from_secs(settings.recheck_interval_secs.max(1)),
        shutdown.clone(),
    );

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    runner.run().await.context("Scheduler loop failed")?;

    engine.store().flush().context("Failed to flush storage")?;
    info!("Probe daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

// ==================== Tasks ====================

pub fn handle_task(settings: &Settings, cmd: TaskCommands) -> Result<()> {
    let engine = open_engine(settings)?;
    let now = Utc::now();

    match cmd {
        TaskCommands::Add {
            name,
            address,
            port,
            interval,
            high_priority,
            max_instances,
            enable,
        } => {
            let mut new = NewTask::new(name, address, port, interval);
            new.high_priority = high_priority;
            new.max_instances = max_instances;
            let mut task = engine.create_task(new, now)?;
            if enable {
                engine.handle(task.id, TaskEvent::Enable, now)?;
                task = require(&engine, task.id)?;
            }
            println!("Created task {}", task.id);
            println!("{}", format_task(&task));
        }
        TaskCommands::List => {
            let tasks = engine.list_tasks()?;
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                println!("{}", format_task_line(&task));
            }
        }
        TaskCommands::Show { id } => {
            println!("{}", format_task(&require(&engine, TaskId(id))?));
        }
        TaskCommands::Enable { id } => {
            engine.handle(TaskId(id), TaskEvent::Enable, now)?;
            println!("{}", format_task_line(&require(&engine, TaskId(id))?));
        }
        TaskCommands::Disable { id } => {
            engine.handle(TaskId(id), TaskEvent::Disable, now)?;
            println!("{}", format_task_line(&require(&engine, TaskId(id))?));
        }
        TaskCommands::Edit {
            id,
            name,
            address,
            port,
            interval,
            high_priority,
            max_instances,
        } => {
            let edit = TaskEdit {
                name,
                address,
                port,
                interval_secs: interval,
                high_priority,
                max_instances,
            };
            engine.update_task(TaskId(id), edit, now)?;
            println!("{}", format_task(&require(&engine, TaskId(id))?));
        }
        TaskCommands::Remove { id } => {
            engine.remove_task(TaskId(id))?;
            println!("Removed task {}", id);
        }
    }

    Ok(())
}

fn require(engine: &RescheduleEngine<Storage>, id: TaskId) -> Result<Task> {
    engine
        .get_task(id)?
        .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()).into())
}

fn format_state(state: &TaskState) -> String {
    match state {
        TaskState::Idle => "idle".to_string(),
        TaskState::Scheduled { wake_at, kind } => {
            format!("scheduled ({:?}) at {}", kind, wake_at.to_rfc3339())
        }
        TaskState::Running { started_at } => format!("running since {}", started_at.to_rfc3339()),
        TaskState::Suspended { resume_at } => {
            format!("suspended until {}", resume_at.to_rfc3339())
        }
    }
}

fn format_task_line(task: &Task) -> String {
    format!(
        "{:>4}  {:<20} {:<28} every {:>5}s  {:<8} {}",
        task.id,
        task.name,
        task.target(),
        task.interval_secs,
        if task.enabled { "enabled" } else { "disabled" },
        format_state(&task.state),
    )
}

fn format_task(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("Task {}\n", task.id));
    out.push_str(&format!("  Name:          {}\n", task.name));
    out.push_str(&format!("  Target:        {}\n", task.target()));
    out.push_str(&format!("  Interval:      {}s\n", task.interval_secs));
    out.push_str(&format!("  High priority: {}\n", task.high_priority));
    out.push_str(&format!("  Max instances: {}\n", task.max_instances));
    out.push_str(&format!("  Enabled:       {}\n", task.enabled));
    out.push_str(&format!("  Scheduler id:  {}\n", task.scheduler_id));
    out.push_str(&format!("  State:         {}\n", format_state(&task.state)));
    match &task.last_outcome {
        Some(outcome) => out.push_str(&format!("  Last outcome:  {:?}", outcome)),
        None => out.push_str("  Last outcome:  never run"),
    }
    if let Some(last_run) = task.last_run {
        out.push_str(&format!("\n  Last run:      {}", last_run.to_rfc3339()));
    }
    out
}

// ==================== Intervals ====================

pub fn handle_intervals(settings: &Settings, cmd: IntervalCommands) -> Result<()> {
    let engine = open_engine(settings)?;
    let now = Utc::now();

    match cmd {
        IntervalCommands::List => {
            let raw = engine.raw_intervals()?;
            if raw.is_empty() {
                println!("No suspension intervals.");
                return Ok(());
            }
            let set = engine.intervals();
            println!("Suspension intervals ({}):", engine.timezone());
            for interval in &raw {
                let status = if set.iter().any(|accepted| accepted.id == interval.id) {
                    "active"
                } else {
                    "ignored"
                };
                println!("  {:>3}  {}  {}", interval.id, interval, status);
            }
        }
        IntervalCommands::Add { start, end } => {
            let (interval, _) = engine.add_interval(start, end, now)?;
            let accepted = engine.intervals().iter().any(|i| i.id == interval.id);
            println!("Added interval {} ({})", interval.id, interval);
            if !accepted {
                println!("Note: interval is too short or conflicts with another and is not in force");
            }
        }
        IntervalCommands::Remove { id } => {
            engine.remove_interval(id, now)?;
            println!("Removed interval {}", id);
        }
        IntervalCommands::Import { path } => {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path))?;
            let raw: Vec<Interval> =
                serde_json::from_str(&data).context("Failed to parse interval list")?;
            let count = raw.len();
            engine.import_intervals(raw, now)?;
            println!(
                "Imported {} intervals, {} in force",
                count,
                engine.intervals().len()
            );
        }
        IntervalCommands::Export => {
            let raw = engine.raw_intervals()?;
            println!("{}", serde_json::to_string_pretty(&raw)?);
        }
        IntervalCommands::Clear => {
            engine.replace_intervals(Vec::new(), now)?;
            println!("Cleared all suspension intervals");
        }
    }

    Ok(())
}

// ==================== Suspension ====================

pub fn handle_suspension(settings: &Settings, cmd: SuspensionCommands) -> Result<()> {
    let engine = open_engine(settings)?;
    let now = Utc::now();

    match cmd {
        SuspensionCommands::Status => {
            if !engine.suspension_enabled() {
                println!("Suspension windows: disabled");
                return Ok(());
            }
            println!("Suspension windows: enabled");
            match engine.refresh_suspension(now)? {
                Some(state) if state.suspended => {
                    println!("Currently suspended (since {})", state.timestamp.to_rfc3339());
                }
                Some(state) => {
                    println!("Not suspended (since {})", state.timestamp.to_rfc3339());
                }
                None => println!("Not suspended"),
            }
        }
        SuspensionCommands::Enable => {
            engine.set_suspension_enabled(true, now)?;
            println!("Suspension windows enabled");
        }
        SuspensionCommands::Disable => {
            engine.set_suspension_enabled(false, now)?;
            println!("Suspension windows disabled");
        }
    }

    Ok(())
}

// ==================== Admin ====================

pub fn handle_admin(settings: &Settings, cmd: AdminCommands) -> Result<()> {
    let storage = open_storage(settings)?;

    match cmd {
        AdminCommands::Stats => {
            let stats = storage.get_stats().context("Failed to read storage stats")?;
            println!("Database: {}", settings.expanded_db_path().display());
            println!("  Tasks:              {}", stats.task_count);
            println!("  Intervals:          {}", stats.interval_count);
            println!("  Scheduler ids:      {}", stats.scheduler_id_count);
            println!("  Instance counters:  {}", stats.instance_counter_count);
            println!("  Disk usage:         {} bytes", stats.disk_usage_bytes);
        }
        AdminCommands::Compact => {
            println!("Compacting database...");
            storage.compact().context("Compaction failed")?;
            println!("Compaction complete");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_types::TimeOfDay;
    use tempfile::TempDir;

    fn test_settings(dir: &TempDir) -> Settings {
        Settings {
            db_path: dir.path().join("db").to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_task_add_and_enable() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);

        handle_task(
            &settings,
            TaskCommands::Add {
                name: "gateway".to_string(),
                address: "10.0.0.1".to_string(),
                port: 443,
                interval: 60,
                high_priority: true,
                max_instances: 2,
                enable: true,
            },
        )
        .unwrap();

        let engine = open_engine(&settings).unwrap();
        let tasks = engine.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].enabled);
        assert!(tasks[0].high_priority);
        assert_eq!(tasks[0].max_instances, 2);
        assert!(matches!(tasks[0].state, TaskState::Scheduled { .. }));
    }

    #[test]
    fn test_task_edit_and_remove() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        let id = {
            let engine = open_engine(&settings).unwrap();
            engine
                .create_task(NewTask::new("db", "10.0.0.2", 5432, 300), Utc::now())
                .unwrap()
                .id
        };

        handle_task(
            &settings,
            TaskCommands::Edit {
                id: id.0,
                name: None,
                address: None,
                port: Some(6432),
                interval: None,
                high_priority: None,
                max_instances: None,
            },
        )
        .unwrap();
        {
            let engine = open_engine(&settings).unwrap();
            assert_eq!(engine.get_task(id).unwrap().unwrap().port, 6432);
        }

        handle_task(&settings, TaskCommands::Remove { id: id.0 }).unwrap();
        let engine = open_engine(&settings).unwrap();
        assert!(engine.get_task(id).unwrap().is_none());
    }

    #[test]
    fn test_unknown_task_is_error() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        assert!(handle_task(&settings, TaskCommands::Show { id: 42 }).is_err());
        assert!(handle_task(&settings, TaskCommands::Enable { id: 42 }).is_err());
    }

    #[test]
    fn test_interval_import_and_clear() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);

        let raw = vec![
            Interval::new(7, TimeOfDay::new(22, 0).unwrap(), TimeOfDay::new(6, 0).unwrap()),
            Interval::new(9, TimeOfDay::new(12, 0).unwrap(), TimeOfDay::new(12, 5).unwrap()),
        ];
        let file = dir.path().join("intervals.json");
        fs::write(&file, serde_json::to_string(&raw).unwrap()).unwrap();

        handle_intervals(
            &settings,
            IntervalCommands::Import {
                path: file.to_string_lossy().to_string(),
            },
        )
        .unwrap();
        {
            let engine = open_engine(&settings).unwrap();
            let stored = engine.raw_intervals().unwrap();
            assert_eq!(stored.len(), 2);
            // Renumbered on import
            assert_eq!(stored[0].id, 1);
            // The five-minute window is too short to be in force
            assert_eq!(engine.intervals().len(), 1);
        }

        handle_intervals(&settings, IntervalCommands::Clear).unwrap();
        let engine = open_engine(&settings).unwrap();
        assert!(engine.raw_intervals().unwrap().is_empty());
    }

    #[test]
    fn test_interval_remove_unknown_is_error() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        assert!(handle_intervals(&settings, IntervalCommands::Remove { id: 3 }).is_err());
    }

    #[test]
    fn test_suspension_toggle_persists() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);

        handle_suspension(&settings, SuspensionCommands::Disable).unwrap();
        {
            let engine = open_engine(&settings).unwrap();
            assert!(!engine.suspension_enabled());
        }
        handle_suspension(&settings, SuspensionCommands::Enable).unwrap();
        let engine = open_engine(&settings).unwrap();
        assert!(engine.suspension_enabled());
    }

    #[test]
    fn test_admin_stats_and_compact() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);
        handle_admin(&settings, AdminCommands::Stats).unwrap();
        handle_admin(&settings, AdminCommands::Compact).unwrap();
    }

    #[test]
    fn test_format_task_mentions_state() {
        let task = Task::new(TaskId(3), "web", "example.org", 80, 120);
        let text = format_task(&task);
        assert!(text.contains("example.org:80"));
        assert!(text.contains("idle"));
        assert!(text.contains("never run"));
    }
}
