//! RocksDB-backed [`SchedulerStore`].

use probe_storage::Storage;
use probe_types::{Interval, SchedulerIdEntry, SuspensionState, Task, TaskId};

use crate::store::SchedulerStore;
use crate::SchedulerError;

impl SchedulerStore for Storage {
    fn next_task_id(&self) -> Result<TaskId, SchedulerError> {
        Ok(Storage::next_task_id(self)?)
    }

    fn load_task(&self, id: TaskId) -> Result<Option<Task>, SchedulerError> {
        Ok(self.get_task(id)?)
    }

    fn save_task(&self, task: &Task) -> Result<(), SchedulerError> {
        Ok(self.put_task(task)?)
    }

    fn load_tasks(&self) -> Result<Vec<Task>, SchedulerError> {
        Ok(self.get_tasks()?)
    }

    fn delete_task(&self, id: TaskId) -> Result<(), SchedulerError> {
        Ok(Storage::delete_task(self, id)?)
    }

    fn load_intervals(&self) -> Result<Vec<Interval>, SchedulerError> {
        Ok(self.get_intervals()?)
    }

    fn save_intervals(&self, intervals: &[Interval]) -> Result<(), SchedulerError> {
        Ok(self.put_intervals(intervals)?)
    }

    fn load_history(&self) -> Result<Vec<SchedulerIdEntry>, SchedulerError> {
        Ok(self.get_scheduler_ids()?)
    }

    fn update_history<R>(
        &self,
        f: impl FnOnce(&mut Vec<SchedulerIdEntry>) -> R,
    ) -> Result<R, SchedulerError> {
        Ok(self.update_scheduler_ids(f)?)
    }

    fn read_instances(&self, id: TaskId) -> Result<u32, SchedulerError> {
        Ok(self.get_instance_count(id)?)
    }

    fn update_instances<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut u32) -> R,
    ) -> Result<R, SchedulerError> {
        Ok(self.update_instance_count(id, f)?)
    }

    fn reset_all_instances(&self) -> Result<usize, SchedulerError> {
        Ok(self.reset_all_instance_counts()?)
    }

    fn load_suspension_state(&self) -> Result<Option<SuspensionState>, SchedulerError> {
        Ok(self.get_suspension_state()?)
    }

    fn save_suspension_state(&self, state: &SuspensionState) -> Result<(), SchedulerError> {
        Ok(self.put_suspension_state(state)?)
    }

    fn delete_suspension_state(&self) -> Result<(), SchedulerError> {
        Ok(Storage::delete_suspension_state(self)?)
    }

    fn load_suspension_enabled(&self) -> Result<Option<bool>, SchedulerError> {
        Ok(self.get_suspension_enabled()?)
    }

    fn save_suspension_enabled(&self, enabled: bool) -> Result<(), SchedulerError> {
        Ok(self.put_suspension_enabled(enabled)?)
    }
}
