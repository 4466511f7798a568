//! # probe-types
//!
//! Shared domain types for the probe scheduler.
//!
//! This crate defines the values passed between storage, the scheduling
//! engine and the daemon:
//! - Time of day and daily suspension intervals
//! - Tasks, their scheduling state and run outcomes
//! - Scheduler ids and the history ledger entries that guard them
//! - The cached suspension verdict
//!
//! ## Usage
//!
//! ```rust
//! use probe_types::{Interval, TimeOfDay};
//!
//! let night = Interval::new(1, TimeOfDay::new(23, 0).unwrap(), TimeOfDay::new(6, 0).unwrap());
//! assert!(night.is_wraparound());
//! ```

pub mod error;
pub mod interval;
pub mod scheduler_id;
pub mod suspension;
pub mod task;
pub mod time;

pub use error::ProbeError;
pub use interval::Interval;
pub use scheduler_id::{SchedulerId, SchedulerIdEntry};
pub use suspension::SuspensionState;
pub use task::{AlarmKind, RunOutcome, Task, TaskId, TaskState};
pub use time::{TimeOfDay, MINUTES_PER_DAY};
