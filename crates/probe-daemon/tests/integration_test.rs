//! Integration tests for the probe scheduler.
//!
//! These run the reschedule engine over a real RocksDB store and check that
//! scheduling state survives closing and reopening the database.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use probe_scheduler::{
    Directive, NewTask, RescheduleEngine, SchedulerConfig, SequentialIdSource, TaskEvent,
};
use probe_storage::Storage;
use probe_types::{SchedulerId, TaskState, TimeOfDay};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
}

fn open(dir: &TempDir) -> RescheduleEngine<Storage> {
    let storage = Arc::new(Storage::open(dir.path()).expect("Failed to open storage"));
    RescheduleEngine::new(storage, SchedulerConfig::default()).expect("Failed to build engine")
}

fn arm_time(directive: &Directive) -> DateTime<Utc> {
    match directive {
        Directive::Arm { at, .. } => *at,
        other => panic!("expected Arm, got {:?}", other),
    }
}

#[test]
fn test_restart_restores_future_wake() {
    let dir = TempDir::new().unwrap();
    let id = {
        let engine = open(&dir);
        let task = engine
            .create_task(NewTask::new("gateway", "10.0.0.1", 443, 300), at(12, 0))
            .unwrap();
        let directive = engine.handle(task.id, TaskEvent::Enable, at(12, 0)).unwrap();
        assert_eq!(arm_time(&directive), at(12, 5));
        task.id
    };

    let engine = open(&dir);
    let directives = engine.restart(at(12, 1)).unwrap();
    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].task_id(), Some(id));
    assert_eq!(arm_time(&directives[0]), at(12, 5));
}

#[test]
fn test_restart_replaces_missed_wake() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        let task = engine
            .create_task(NewTask::new("gateway", "10.0.0.1", 443, 300), at(12, 0))
            .unwrap();
        engine.handle(task.id, TaskEvent::Enable, at(12, 0)).unwrap();
    }

    let engine = open(&dir);
    let directives = engine.restart(at(13, 0)).unwrap();
    assert_eq!(arm_time(&directives[0]), at(13, 5));
}

#[test]
fn test_restart_drops_stale_instance_counts() {
    let dir = TempDir::new().unwrap();
    let id = {
        let engine = open(&dir);
        let task = engine
            .create_task(NewTask::new("db", "10.0.0.2", 5432, 60), at(9, 0))
            .unwrap();
        engine.handle(task.id, TaskEvent::Enable, at(9, 0)).unwrap();
        engine.instances().increase(task.id).unwrap();
        engine.instances().increase(task.id).unwrap();
        assert_eq!(engine.instances().read(task.id).unwrap(), 2);
        task.id
    };

    let engine = open(&dir);
    assert_eq!(engine.instances().read(id).unwrap(), 2);
    engine.restart(at(9, 30)).unwrap();
    assert_eq!(engine.instances().read(id).unwrap(), 0);
}

#[test]
fn test_disabled_tasks_stay_idle_on_restart() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        engine
            .create_task(NewTask::new("web", "example.org", 80, 60), at(8, 0))
            .unwrap();
    }

    let engine = open(&dir);
    assert!(engine.restart(at(8, 30)).unwrap().is_empty());
    let tasks = engine.list_tasks().unwrap();
    assert_eq!(tasks[0].state, TaskState::Idle);
}

#[test]
fn test_scheduler_id_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = SchedulerConfig {
        max_id_attempts: 5,
        ..Default::default()
    };
    let storage = Arc::new(Storage::open(dir.path()).unwrap());
    {
        let engine = RescheduleEngine::with_id_source(
            Arc::clone(&storage),
            config.clone(),
            Box::new(SequentialIdSource::new(1, 2)),
        )
        .unwrap();
        let a = engine
            .create_task(NewTask::new("a", "10.0.0.1", 22, 60), at(10, 0))
            .unwrap();
        let b = engine
            .create_task(NewTask::new("b", "10.0.0.2", 22, 60), at(10, 0))
            .unwrap();
        assert_eq!(a.scheduler_id, SchedulerId(1));
        assert_eq!(b.scheduler_id, SchedulerId(2));
    }
    drop(storage);

    // A fresh source replays the same candidates; the stored ledger rejects them
    let storage = Arc::new(Storage::open(dir.path()).unwrap());
    let engine = RescheduleEngine::with_id_source(
        storage,
        config,
        Box::new(SequentialIdSource::new(1, 2)),
    )
    .unwrap();
    let c = engine
        .create_task(NewTask::new("c", "10.0.0.3", 22, 60), at(10, 1))
        .unwrap();
    assert_eq!(c.scheduler_id, SchedulerId::INVALID);

    let directive = engine.handle(c.id, TaskEvent::Enable, at(10, 1)).unwrap();
    assert!(matches!(directive, Directive::Unschedulable { .. }));
    assert_eq!(engine.get_task(c.id).unwrap().unwrap().state, TaskState::Idle);
}

#[test]
fn test_suspension_windows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let engine = open(&dir);
        engine
            .add_interval(
                TimeOfDay::new(22, 0).unwrap(),
                TimeOfDay::new(6, 0).unwrap(),
                at(21, 0),
            )
            .unwrap();
        let task = engine
            .create_task(NewTask::new("gateway", "10.0.0.1", 443, 300), at(23, 0))
            .unwrap();
        engine.handle(task.id, TaskEvent::Enable, at(23, 0)).unwrap();

        let stored = engine.get_task(task.id).unwrap().unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 3, 5, 6, 0, 0).unwrap();
        assert_eq!(stored.state, TaskState::Suspended { resume_at: morning });
        engine.refresh_suspension(at(23, 0)).unwrap();
        assert!(engine.is_suspended());
        task.id
    };

    let engine = open(&dir);
    assert_eq!(engine.intervals().len(), 1);
    assert_eq!(engine.raw_intervals().unwrap().len(), 1);
    // Cached verdict is loaded before anything recomputes it
    assert!(engine.is_suspended());

    let directives = engine.restart(at(23, 30)).unwrap();
    assert_eq!(directives[0].task_id(), Some(id));
    assert_eq!(
        arm_time(&directives[0]),
        Utc.with_ymd_and_hms(2024, 3, 5, 6, 0, 0).unwrap()
    );
}

#[test]
fn test_suspension_toggle_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open(&dir);
        engine
            .add_interval(
                TimeOfDay::new(22, 0).unwrap(),
                TimeOfDay::new(6, 0).unwrap(),
                at(21, 0),
            )
            .unwrap();
        engine.set_suspension_enabled(false, at(21, 0)).unwrap();
    }

    let engine = open(&dir);
    assert!(!engine.suspension_enabled());
    let task = engine
        .create_task(NewTask::new("gateway", "10.0.0.1", 443, 300), at(23, 0))
        .unwrap();
    let directive = engine.handle(task.id, TaskEvent::Enable, at(23, 0)).unwrap();
    assert_eq!(arm_time(&directive), at(23, 5));
}
