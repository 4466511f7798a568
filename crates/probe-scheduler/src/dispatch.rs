//! Directives emitted by the engine and the collaborators that carry them out.

use std::time::Duration;

use chrono::{DateTime, Utc};
use probe_types::{AlarmKind, SchedulerId, Task, TaskId};
use tracing::debug;

/// Wakes tasks up later. Arming a task replaces any alarm it already has.
pub trait AlarmDispatcher {
    /// Fire at `at`; the host must not delay it.
    fn schedule_exact(&self, at: DateTime<Utc>, task: TaskId, scheduler_id: SchedulerId);

    /// Fire after roughly `delay`; the host may batch it with other wake-ups.
    fn schedule_inexact(&self, delay: Duration, task: TaskId, scheduler_id: SchedulerId);

    fn cancel(&self, task: TaskId);
}

/// Runs task executions. Completions come back to the engine as
/// `TaskEvent::WorkerFinished`.
pub trait WorkerDispatcher {
    fn start(&self, task: &Task, scheduler_id: SchedulerId);

    fn stop(&self, task: TaskId);
}

/// What the host should do after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Arm the task's next wake-up under `scheduler_id`
    Arm {
        task: TaskId,
        scheduler_id: SchedulerId,
        at: DateTime<Utc>,
        kind: AlarmKind,
    },
    /// Drop any pending wake-up and in-flight work
    Cancel { task: TaskId },
    /// Start a worker now
    Dispatch {
        task: Box<Task>,
        scheduler_id: SchedulerId,
    },
    /// No scheduler id could be allocated; the task stays idle
    Unschedulable { task: TaskId },
    /// Nothing to do
    Ignore,
}

impl Directive {
    /// Task the directive concerns, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Directive::Arm { task, .. }
            | Directive::Cancel { task }
            | Directive::Unschedulable { task } => Some(*task),
            Directive::Dispatch { task, .. } => Some(task.id),
            Directive::Ignore => None,
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Directive::Ignore)
    }

    /// Carry the directive out against the host's dispatchers.
    pub fn apply<A, W>(&self, now: DateTime<Utc>, alarms: &A, workers: &W)
    where
        A: AlarmDispatcher + ?Sized,
        W: WorkerDispatcher + ?Sized,
    {
        match self {
            Directive::Arm {
                task,
                scheduler_id,
                at,
                kind: AlarmKind::Exact,
            } => alarms.schedule_exact(*at, *task, *scheduler_id),
            Directive::Arm {
                task,
                scheduler_id,
                at,
                kind: AlarmKind::Inexact,
            } => {
                let delay = (*at - now).to_std().unwrap_or(Duration::ZERO);
                alarms.schedule_inexact(delay, *task, *scheduler_id);
            }
            Directive::Cancel { task } => {
                alarms.cancel(*task);
                workers.stop(*task);
            }
            Directive::Dispatch { task, scheduler_id } => workers.start(task, *scheduler_id),
            Directive::Unschedulable { task } => alarms.cancel(*task),
            Directive::Ignore => {}
        }
        debug!(directive = self.kind_name(), task = ?self.task_id(), "Applied directive");
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Directive::Arm { .. } => "arm",
            Directive::Cancel { .. } => "cancel",
            Directive::Dispatch { .. } => "dispatch",
            Directive::Unschedulable { .. } => "unschedulable",
            Directive::Ignore => "ignore",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AlarmDispatcher for Recorder {
        fn schedule_exact(&self, at: DateTime<Utc>, task: TaskId, sid: SchedulerId) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("exact {} {} {}", task, sid, at.format("%H:%M")));
        }

        fn schedule_inexact(&self, delay: Duration, task: TaskId, sid: SchedulerId) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("inexact {} {} {}s", task, sid, delay.as_secs()));
        }

        fn cancel(&self, task: TaskId) {
            self.calls.lock().unwrap().push(format!("cancel {}", task));
        }
    }

    impl WorkerDispatcher for Recorder {
        fn start(&self, task: &Task, sid: SchedulerId) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("start {} {}", task.id, sid));
        }

        fn stop(&self, task: TaskId) {
            self.calls.lock().unwrap().push(format!("stop {}", task));
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_arm_exact_and_inexact() {
        let rec = Recorder::default();
        Directive::Arm {
            task: TaskId(1),
            scheduler_id: SchedulerId(7),
            at: now() + chrono::Duration::minutes(5),
            kind: AlarmKind::Exact,
        }
        .apply(now(), &rec, &rec);
        Directive::Arm {
            task: TaskId(2),
            scheduler_id: SchedulerId(8),
            at: now() + chrono::Duration::minutes(5),
            kind: AlarmKind::Inexact,
        }
        .apply(now(), &rec, &rec);

        assert_eq!(rec.calls(), vec!["exact 1 7 10:05", "inexact 2 8 300s"]);
    }

    #[test]
    fn test_inexact_in_the_past_fires_now() {
        let rec = Recorder::default();
        Directive::Arm {
            task: TaskId(1),
            scheduler_id: SchedulerId(7),
            at: now() - chrono::Duration::minutes(5),
            kind: AlarmKind::Inexact,
        }
        .apply(now(), &rec, &rec);
        assert_eq!(rec.calls(), vec!["inexact 1 7 0s"]);
    }

    #[test]
    fn test_cancel_stops_workers() {
        let rec = Recorder::default();
        Directive::Cancel { task: TaskId(3) }.apply(now(), &rec, &rec);
        assert_eq!(rec.calls(), vec!["cancel 3", "stop 3"]);
    }

    #[test]
    fn test_dispatch_starts_worker() {
        let rec = Recorder::default();
        let task = Task::new(TaskId(4), "t", "example.com", 443, 60);
        let directive = Directive::Dispatch {
            task: Box::new(task),
            scheduler_id: SchedulerId(2),
        };
        assert_eq!(directive.task_id(), Some(TaskId(4)));
        directive.apply(now(), &rec, &rec);
        assert_eq!(rec.calls(), vec!["start 4 2"]);
    }

    #[test]
    fn test_ignore_is_noop() {
        let rec = Recorder::default();
        Directive::Ignore.apply(now(), &rec, &rec);
        assert!(rec.calls().is_empty());
        assert!(Directive::Ignore.is_ignore());
    }
}
