//! Persistence seam for the engine.
//!
//! The engine owns no storage. Everything it must remember across events
//! goes through [`SchedulerStore`]. The history ledger and instance counters
//! are shared between tasks and only change through the closure-based
//! `update_*` methods, which implementations must run as one atomic
//! read-modify-write.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use probe_types::{Interval, SchedulerIdEntry, SuspensionState, Task, TaskId};

use crate::SchedulerError;

pub trait SchedulerStore: Send + Sync {
    /// Hand out the next unused task id.
    fn next_task_id(&self) -> Result<TaskId, SchedulerError>;

    fn load_task(&self, id: TaskId) -> Result<Option<Task>, SchedulerError>;

    fn save_task(&self, task: &Task) -> Result<(), SchedulerError>;

    /// All tasks ordered by id.
    fn load_tasks(&self) -> Result<Vec<Task>, SchedulerError>;

    /// Delete a task and its instance counter.
    fn delete_task(&self, id: TaskId) -> Result<(), SchedulerError>;

    /// The raw, user-maintained interval list.
    fn load_intervals(&self) -> Result<Vec<Interval>, SchedulerError>;

    fn save_intervals(&self, intervals: &[Interval]) -> Result<(), SchedulerError>;

    /// The scheduler id ledger, oldest entry first.
    fn load_history(&self) -> Result<Vec<SchedulerIdEntry>, SchedulerError>;

    /// Atomically read, modify and write back the scheduler id ledger.
    fn update_history<R>(
        &self,
        f: impl FnOnce(&mut Vec<SchedulerIdEntry>) -> R,
    ) -> Result<R, SchedulerError>;

    fn read_instances(&self, id: TaskId) -> Result<u32, SchedulerError>;

    /// Atomically read, modify and write back one instance counter.
    fn update_instances<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut u32) -> R,
    ) -> Result<R, SchedulerError>;

    /// Zero every instance counter; returns how many were cleared.
    fn reset_all_instances(&self) -> Result<usize, SchedulerError>;

    fn load_suspension_state(&self) -> Result<Option<SuspensionState>, SchedulerError>;

    fn save_suspension_state(&self, state: &SuspensionState) -> Result<(), SchedulerError>;

    fn delete_suspension_state(&self) -> Result<(), SchedulerError>;

    /// Persisted suspension on/off switch; `None` when never set.
    fn load_suspension_enabled(&self) -> Result<Option<bool>, SchedulerError>;

    fn save_suspension_enabled(&self, enabled: bool) -> Result<(), SchedulerError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    last_task_id: u64,
    tasks: BTreeMap<TaskId, Task>,
    intervals: Vec<Interval>,
    history: Vec<SchedulerIdEntry>,
    instances: HashMap<TaskId, u32>,
    suspension: Option<SuspensionState>,
    suspension_enabled: Option<bool>,
}

/// In-memory store, used by tests and by hosts that need no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SchedulerStore for MemoryStore {
    fn next_task_id(&self) -> Result<TaskId, SchedulerError> {
        let mut inner = self.lock();
        inner.last_task_id += 1;
        Ok(TaskId(inner.last_task_id))
    }

    fn load_task(&self, id: TaskId) -> Result<Option<Task>, SchedulerError> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    fn save_task(&self, task: &Task) -> Result<(), SchedulerError> {
        self.lock().tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn load_tasks(&self) -> Result<Vec<Task>, SchedulerError> {
        Ok(self.lock().tasks.values().cloned().collect())
    }

    fn delete_task(&self, id: TaskId) -> Result<(), SchedulerError> {
        let mut inner = self.lock();
        inner.tasks.remove(&id);
        inner.instances.remove(&id);
        Ok(())
    }

    fn load_intervals(&self) -> Result<Vec<Interval>, SchedulerError> {
        Ok(self.lock().intervals.clone())
    }

    fn save_intervals(&self, intervals: &[Interval]) -> Result<(), SchedulerError> {
        self.lock().intervals = intervals.to_vec();
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<SchedulerIdEntry>, SchedulerError> {
        Ok(self.lock().history.clone())
    }

    fn update_history<R>(
        &self,
        f: impl FnOnce(&mut Vec<SchedulerIdEntry>) -> R,
    ) -> Result<R, SchedulerError> {
        let mut inner = self.lock();
        Ok(f(&mut inner.history))
    }

    fn read_instances(&self, id: TaskId) -> Result<u32, SchedulerError> {
        Ok(self.lock().instances.get(&id).copied().unwrap_or(0))
    }

    fn update_instances<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut u32) -> R,
    ) -> Result<R, SchedulerError> {
        let mut inner = self.lock();
        let count = inner.instances.entry(id).or_insert(0);
        Ok(f(count))
    }

    fn reset_all_instances(&self) -> Result<usize, SchedulerError> {
        let mut inner = self.lock();
        let cleared = inner.instances.len();
        inner.instances.clear();
        Ok(cleared)
    }

    fn load_suspension_state(&self) -> Result<Option<SuspensionState>, SchedulerError> {
        Ok(self.lock().suspension)
    }

    fn save_suspension_state(&self, state: &SuspensionState) -> Result<(), SchedulerError> {
        self.lock().suspension = Some(*state);
        Ok(())
    }

    fn delete_suspension_state(&self) -> Result<(), SchedulerError> {
        self.lock().suspension = None;
        Ok(())
    }

    fn load_suspension_enabled(&self) -> Result<Option<bool>, SchedulerError> {
        Ok(self.lock().suspension_enabled)
    }

    fn save_suspension_enabled(&self, enabled: bool) -> Result<(), SchedulerError> {
        self.lock().suspension_enabled = Some(enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_task_ids_increase() {
        let store = MemoryStore::new();
        assert_eq!(store.next_task_id().unwrap(), TaskId(1));
        assert_eq!(store.next_task_id().unwrap(), TaskId(2));
    }

    #[test]
    fn test_delete_task_drops_counter() {
        let store = MemoryStore::new();
        let task = Task::new(TaskId(1), "t", "example.com", 80, 60);
        store.save_task(&task).unwrap();
        store.update_instances(task.id, |c| *c = 3).unwrap();

        store.delete_task(task.id).unwrap();
        assert!(store.load_task(task.id).unwrap().is_none());
        assert_eq!(store.read_instances(task.id).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_counter_updates() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.update_instances(TaskId(1), |c| *c += 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.read_instances(TaskId(1)).unwrap(), 400);
    }
}
