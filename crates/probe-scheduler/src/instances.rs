//! Per-task in-flight execution counters.
//!
//! Every mutation is one atomic store update, so concurrent completions of
//! the same task cannot lose a decrement.

use std::sync::Arc;

use probe_types::TaskId;
use tracing::debug;

use crate::store::SchedulerStore;
use crate::SchedulerError;

/// Result of [`InstanceAccountant::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counter was incremented; carries the new count
    Admitted(u32),
    /// Ceiling already reached; carries the unchanged count
    Busy(u32),
}

pub struct InstanceAccountant<S> {
    store: Arc<S>,
}

impl<S: SchedulerStore> InstanceAccountant<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn reset(&self, task: TaskId) -> Result<(), SchedulerError> {
        self.store.update_instances(task, |count| *count = 0)
    }

    /// Count one more worker in flight. Returns the new count.
    pub fn increase(&self, task: TaskId) -> Result<u32, SchedulerError> {
        self.store.update_instances(task, |count| {
            *count = count.saturating_add(1);
            *count
        })
    }

    /// Count one worker finished. Never goes below zero.
    pub fn decrease(&self, task: TaskId) -> Result<u32, SchedulerError> {
        self.store.update_instances(task, |count| {
            if *count == 0 {
                debug!(task = %task, "Instance counter already zero");
            } else {
                *count -= 1;
            }
            *count
        })
    }

    pub fn read(&self, task: TaskId) -> Result<u32, SchedulerError> {
        self.store.read_instances(task)
    }

    /// Zero every counter. In-flight counts from a previous process are stale.
    pub fn reset_all(&self) -> Result<usize, SchedulerError> {
        let cleared = self.store.reset_all_instances()?;
        debug!(cleared, "Reset all instance counters");
        Ok(cleared)
    }

    /// Increment only if the count is below `ceiling`, as one atomic update.
    pub fn try_acquire(&self, task: TaskId, ceiling: u32) -> Result<Admission, SchedulerError> {
        self.store.update_instances(task, |count| {
            if *count >= ceiling {
                Admission::Busy(*count)
            } else {
                *count += 1;
                Admission::Admitted(*count)
            }
        })
    }
}
