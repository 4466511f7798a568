//! Monitored task record and its scheduling state.
//!
//! A task is one user-configured recurring reachability check. The record
//! carries both the user's settings and the engine's bookkeeping (scheduler
//! id, state machine position, last outcome) so that one write persists a
//! complete transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler_id::SchedulerId;

/// Stable task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How punctual a wake-up must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// Fire at the requested instant; the host must not coalesce it
    Exact,
    /// The host may delay the wake-up to batch it with others
    Inexact,
}

impl std::fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmKind::Exact => write!(f, "exact"),
            AlarmKind::Inexact => write!(f, "inexact"),
        }
    }
}

/// Position of a task in the scheduling state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Not armed: disabled, or no scheduler id could be allocated
    #[default]
    Idle,
    /// Armed for the next wake-up
    Scheduled {
        wake_at: DateTime<Utc>,
        kind: AlarmKind,
    },
    /// At least one worker is in flight
    Running { started_at: DateTime<Utc> },
    /// Deferred until the current suspension window ends
    Suspended { resume_at: DateTime<Utc> },
}

impl TaskState {
    /// The instant the task is next expected to wake, if armed.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        match self {
            TaskState::Scheduled { wake_at, .. } => Some(*wake_at),
            TaskState::Suspended { resume_at } => Some(*resume_at),
            TaskState::Idle | TaskState::Running { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Scheduled { .. } => "scheduled",
            TaskState::Running { .. } => "running",
            TaskState::Suspended { .. } => "suspended",
        }
    }
}

/// Result of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunOutcome {
    /// Probe reached its target
    Success,
    /// Probe failed with an error message
    Failed(String),
    /// Not started because the concurrency ceiling was reached
    Busy,
    /// Worker was stopped before it finished
    Interrupted,
}

/// A monitored task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,

    /// Human-readable name
    pub name: String,

    /// Probe target host or address
    pub address: String,

    /// Probe target port
    pub port: u16,

    /// Period between runs, in seconds
    pub interval_secs: u64,

    /// Request exact wake-ups instead of host-batched ones
    #[serde(default)]
    pub high_priority: bool,

    /// Maximum number of concurrent executions
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,

    #[serde(default)]
    pub enabled: bool,

    /// Current scheduling epoch; `SchedulerId::INVALID` when unschedulable
    #[serde(default)]
    pub scheduler_id: SchedulerId,

    #[serde(default)]
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RunOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

fn default_max_instances() -> u32 {
    1
}

impl Task {
    /// Create a disabled, unscheduled task.
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        interval_secs: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            port,
            interval_secs,
            high_priority: false,
            max_instances: default_max_instances(),
            enabled: false,
            scheduler_id: SchedulerId::INVALID,
            state: TaskState::Idle,
            last_outcome: None,
            last_run: None,
        }
    }

    pub fn with_high_priority(mut self, high_priority: bool) -> Self {
        self.high_priority = high_priority;
        self
    }

    pub fn with_max_instances(mut self, max_instances: u32) -> Self {
        self.max_instances = max_instances;
        self
    }

    /// Alarm kind this task asks for.
    pub fn alarm_kind(&self) -> AlarmKind {
        if self.high_priority {
            AlarmKind::Exact
        } else {
            AlarmKind::Inexact
        }
    }

    /// `address:port`, the reachability target.
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_idle_and_unscheduled() {
        let task = Task::new(TaskId(1), "router", "192.168.1.1", 80, 900);
        assert!(!task.enabled);
        assert_eq!(task.state, TaskState::Idle);
        assert!(!task.scheduler_id.is_valid());
        assert_eq!(task.max_instances, 1);
        assert_eq!(task.target(), "192.168.1.1:80");
    }

    #[test]
    fn test_alarm_kind_follows_priority() {
        let task = Task::new(TaskId(1), "a", "host", 1, 60);
        assert_eq!(task.alarm_kind(), AlarmKind::Inexact);
        assert_eq!(task.with_high_priority(true).alarm_kind(), AlarmKind::Exact);
    }

    #[test]
    fn test_state_is_tagged_in_json() {
        let now = DateTime::from_timestamp_millis(1_000).unwrap();
        let state = TaskState::Suspended { resume_at: now };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""state":"suspended""#));
        assert_eq!(state.next_wake(), Some(now));
        assert_eq!(TaskState::Idle.next_wake(), None);
    }

    #[test]
    fn test_task_bytes_preserve_state() {
        let now = DateTime::from_timestamp_millis(5_000).unwrap();
        let mut task = Task::new(TaskId(3), "dns", "1.1.1.1", 53, 300);
        task.state = TaskState::Scheduled {
            wake_at: now,
            kind: AlarmKind::Exact,
        };
        task.last_outcome = Some(RunOutcome::Failed("refused".into()));

        let decoded = Task::from_bytes(&task.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, task);
    }
}
