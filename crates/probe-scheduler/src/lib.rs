//! Scheduling and concurrency control for periodic reachability probes.
//!
//! This crate decides when each monitored task runs next and under which
//! scheduler id, bounds how many executions of one task may be in flight,
//! and defers runs that fall inside daily "do-not-run" windows.
//!
//! # Components
//!
//! - [`intervals`]: cleaning and membership of daily suspension windows,
//!   including windows that cross midnight
//! - [`SuspensionCache`]: last known "inside a window" verdict
//! - [`SchedulerIdGenerator`]: collision-checked scheduler ids against a
//!   bounded history
//! - [`InstanceAccountant`]: per-task in-flight counters
//! - [`RescheduleEngine`]: the per-task state machine that ties them
//!   together and emits [`Directive`]s
//! - [`TokioAlarms`]: an [`AlarmDispatcher`] on tokio timers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use probe_scheduler::{Directive, MemoryStore, NewTask, RescheduleEngine, SchedulerConfig, TaskEvent};
//!
//! let engine = RescheduleEngine::new(Arc::new(MemoryStore::new()), SchedulerConfig::default()).unwrap();
//! let now = Utc::now();
//! let task = engine.create_task(NewTask::new("gateway", "10.0.0.1", 443, 300), now).unwrap();
//!
//! match engine.handle(task.id, TaskEvent::Enable, now).unwrap() {
//!     Directive::Arm { at, .. } => assert!(at > now),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

mod alarms;
mod clock;
mod config;
mod dispatch;
mod engine;
mod error;
mod instances;
pub mod intervals;
mod jitter;
mod scheduler_id;
#[cfg(feature = "storage")]
mod storage;
mod store;
mod suspension;

pub use alarms::{AlarmFire, TokioAlarms};
pub use clock::{floor_to_minute, local_time_of_day, Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use dispatch::{AlarmDispatcher, Directive, WorkerDispatcher};
pub use engine::{NewTask, RescheduleEngine, TaskEdit, TaskEvent, MAX_INTERVAL_SECS};
pub use error::SchedulerError;
pub use instances::{Admission, InstanceAccountant};
pub use intervals::{clean, IntervalRules, IntervalSet};
pub use jitter::JitterConfig;
pub use scheduler_id::{
    IdSource, RandomIdSource, SchedulerIdGenerator, SchedulerIdHistory, SequentialIdSource,
};
pub use store::{MemoryStore, SchedulerStore};
pub use suspension::SuspensionCache;
