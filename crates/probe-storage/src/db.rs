//! RocksDB wrapper for probe scheduler storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Task, interval list and suspension state reads/writes
//! - Atomic read-modify-write of instance counters and the scheduler id
//!   ledger: a process-wide write lock serializes the read, and a single
//!   WriteBatch commits the result

use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use probe_types::{Interval, SchedulerIdEntry, SuspensionState, Task, TaskId};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_INSTANCES, CF_INTERVALS, CF_SCHEDULER_IDS, CF_STATE,
    CF_TASKS,
};
use crate::error::StorageError;
use crate::keys::{HistoryKey, InstanceKey, TaskKey};

const INTERVALS_KEY: &[u8] = b"raw";
const SUSPENSION_KEY: &[u8] = b"suspension";
const SUSPENSION_ENABLED_KEY: &[u8] = b"suspension_enabled";
const TASK_SEQUENCE_KEY: &[u8] = b"task_seq";

/// Main storage interface for the probe scheduler
pub struct Storage {
    db: DB,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (); a poisoned lock carries no broken state
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ==================== Task Methods ====================

    /// Allocate the next task id from the persisted sequence.
    pub fn next_task_id(&self) -> Result<TaskId, StorageError> {
        let cf = self.cf(CF_STATE)?;
        let _guard = self.lock();

        let next = match self.db.get_cf(&cf, TASK_SEQUENCE_KEY)? {
            Some(b) => {
                let buf: [u8; 8] =
                    b.as_slice()
                        .try_into()
                        .map_err(|_| StorageError::CorruptCounter {
                            name: "task sequence".to_string(),
                            expected: 8,
                            found: b.len(),
                        })?;
                u64::from_be_bytes(buf)
            }
            None => 1,
        };
        self.db
            .put_cf(&cf, TASK_SEQUENCE_KEY, (next + 1).to_be_bytes())?;
        Ok(TaskId(next))
    }

    /// Store (insert or overwrite) a task record.
    pub fn put_task(&self, task: &Task) -> Result<(), StorageError> {
        let cf = self.cf(CF_TASKS)?;
        let bytes = task.to_bytes()?;
        self.db.put_cf(&cf, TaskKey::new(task.id).to_bytes(), bytes)?;
        debug!(task = %task.id, state = task.state.name(), "Stored task");
        Ok(())
    }

    /// Get a task by id.
    pub fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, StorageError> {
        let cf = self.cf(CF_TASKS)?;
        match self.db.get_cf(&cf, TaskKey::new(task_id).to_bytes())? {
            Some(bytes) => Ok(Some(Task::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get all tasks ordered by id.
    pub fn get_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let cf = self.cf(CF_TASKS)?;
        let mut tasks = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            tasks.push(Task::from_bytes(&value)?);
        }
        Ok(tasks)
    }

    /// Delete a task together with its instance counter.
    ///
    /// The scheduler id ledger is left alone: it is bounded by time, not by task.
    pub fn delete_task(&self, task_id: TaskId) -> Result<(), StorageError> {
        let tasks_cf = self.cf(CF_TASKS)?;
        let instances_cf = self.cf(CF_INSTANCES)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&tasks_cf, TaskKey::new(task_id).to_bytes());
        batch.delete_cf(&instances_cf, InstanceKey::new(task_id).to_bytes());
        self.db.write(batch)?;

        debug!(task = %task_id, "Deleted task");
        Ok(())
    }

    // ==================== Interval Methods ====================

    /// Replace the raw interval list.
    pub fn put_intervals(&self, intervals: &[Interval]) -> Result<(), StorageError> {
        let cf = self.cf(CF_INTERVALS)?;
        let bytes = Interval::list_to_bytes(intervals)?;
        self.db.put_cf(&cf, INTERVALS_KEY, bytes)?;
        debug!(count = intervals.len(), "Stored raw interval list");
        Ok(())
    }

    /// Get the raw interval list in stored order.
    pub fn get_intervals(&self) -> Result<Vec<Interval>, StorageError> {
        let cf = self.cf(CF_INTERVALS)?;
        match self.db.get_cf(&cf, INTERVALS_KEY)? {
            Some(bytes) => Ok(Interval::list_from_bytes(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    // ==================== Scheduler Id Ledger ====================

    fn read_scheduler_ids(&self, cf: &ColumnFamily) -> Result<Vec<SchedulerIdEntry>, StorageError> {
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            HistoryKey::from_bytes(&key)?;
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    /// Get the scheduler id ledger, oldest entry first.
    pub fn get_scheduler_ids(&self) -> Result<Vec<SchedulerIdEntry>, StorageError> {
        let cf = self.cf(CF_SCHEDULER_IDS)?;
        self.read_scheduler_ids(cf)
    }

    /// Atomically read, modify and rewrite the scheduler id ledger.
    ///
    /// `f` sees the ledger oldest first. The rewritten ledger replaces the
    /// old one in a single batch; rows past the new length are deleted.
    pub fn update_scheduler_ids<R>(
        &self,
        f: impl FnOnce(&mut Vec<SchedulerIdEntry>) -> R,
    ) -> Result<R, StorageError> {
        let cf = self.cf(CF_SCHEDULER_IDS)?;
        let _guard = self.lock();

        let mut entries = self.read_scheduler_ids(cf)?;
        let before = entries.clone();
        let result = f(&mut entries);

        if entries != before {
            let mut batch = WriteBatch::default();
            for (position, entry) in entries.iter().enumerate() {
                batch.put_cf(
                    &cf,
                    HistoryKey::new(position as u32).to_bytes(),
                    serde_json::to_vec(entry)?,
                );
            }
            for position in entries.len()..before.len() {
                batch.delete_cf(&cf, HistoryKey::new(position as u32).to_bytes());
            }
            self.db.write(batch)?;
            debug!(len = entries.len(), "Rewrote scheduler id ledger");
        }

        Ok(result)
    }

    // ==================== Instance Counters ====================

    fn read_count(&self, cf: &ColumnFamily, task_id: TaskId) -> Result<u32, StorageError> {
        match self.db.get_cf(cf, InstanceKey::new(task_id).to_bytes())? {
            Some(b) => {
                let buf: [u8; 4] =
                    b.as_slice()
                        .try_into()
                        .map_err(|_| StorageError::CorruptCounter {
                            name: format!("instances of task {}", task_id),
                            expected: 4,
                            found: b.len(),
                        })?;
                Ok(u32::from_be_bytes(buf))
            }
            None => Ok(0),
        }
    }

    /// Current instance count for a task (0 when never written).
    pub fn get_instance_count(&self, task_id: TaskId) -> Result<u32, StorageError> {
        let cf = self.cf(CF_INSTANCES)?;
        self.read_count(cf, task_id)
    }

    /// Atomically read, modify and write one task's instance counter.
    pub fn update_instance_count<R>(
        &self,
        task_id: TaskId,
        f: impl FnOnce(&mut u32) -> R,
    ) -> Result<R, StorageError> {
        let cf = self.cf(CF_INSTANCES)?;
        let _guard = self.lock();

        let mut count = self.read_count(cf, task_id)?;
        let before = count;
        let result = f(&mut count);
        if count != before {
            self.db
                .put_cf(&cf, InstanceKey::new(task_id).to_bytes(), count.to_be_bytes())?;
        }
        Ok(result)
    }

    /// Zero every instance counter. Returns the number of counters cleared.
    pub fn reset_all_instance_counts(&self) -> Result<usize, StorageError> {
        let cf = self.cf(CF_INSTANCES)?;
        let _guard = self.lock();

        let mut batch = WriteBatch::default();
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(&cf, &key);
            count += 1;
        }
        if count > 0 {
            self.db.write(batch)?;
        }
        debug!(count, "Reset instance counters");
        Ok(count)
    }

    // ==================== Suspension State ====================

    pub fn put_suspension_state(&self, state: &SuspensionState) -> Result<(), StorageError> {
        let cf = self.cf(CF_STATE)?;
        self.db.put_cf(&cf, SUSPENSION_KEY, state.to_bytes()?)?;
        Ok(())
    }

    pub fn get_suspension_state(&self) -> Result<Option<SuspensionState>, StorageError> {
        let cf = self.cf(CF_STATE)?;
        match self.db.get_cf(&cf, SUSPENSION_KEY)? {
            Some(bytes) => Ok(Some(SuspensionState::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_suspension_state(&self) -> Result<(), StorageError> {
        let cf = self.cf(CF_STATE)?;
        self.db.delete_cf(&cf, SUSPENSION_KEY)?;
        Ok(())
    }

    /// Persisted suspension on/off switch, `None` if never written.
    pub fn get_suspension_enabled(&self) -> Result<Option<bool>, StorageError> {
        let cf = self.cf(CF_STATE)?;
        Ok(self
            .db
            .get_cf(&cf, SUSPENSION_ENABLED_KEY)?
            .and_then(|b| b.first().map(|flag| *flag != 0)))
    }

    pub fn put_suspension_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        let cf = self.cf(CF_STATE)?;
        self.db
            .put_cf(&cf, SUSPENSION_ENABLED_KEY, [u8::from(enabled)])?;
        Ok(())
    }

    // ===== Admin Operations =====

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    /// Trigger manual compaction on all column families.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction...");
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf::<&[u8], &[u8]>(&cf, None, None);
            }
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();

        if let Some(cf) = self.db.cf_handle(CF_TASKS) {
            stats.task_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_SCHEDULER_IDS) {
            stats.scheduler_id_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_INSTANCES) {
            stats.instance_counter_count = self.count_cf_entries(cf)?;
        }
        stats.interval_count = self.get_intervals()?.len() as u64;
        stats.disk_usage_bytes = self.get_disk_usage();

        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of task records
    pub task_count: u64,
    /// Number of raw suspension intervals
    pub interval_count: u64,
    /// Number of scheduler id ledger rows
    pub scheduler_id_count: u64,
    /// Number of instance counters written
    pub instance_counter_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use probe_types::{SchedulerId, TimeOfDay};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_task_id_sequence_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = Storage::open(temp_dir.path()).unwrap();
            assert_eq!(storage.next_task_id().unwrap(), TaskId(1));
            assert_eq!(storage.next_task_id().unwrap(), TaskId(2));
        }
        let storage = Storage::open(temp_dir.path()).unwrap();
        assert_eq!(storage.next_task_id().unwrap(), TaskId(3));
    }

    #[test]
    fn test_put_get_delete_task() {
        let (storage, _temp) = create_test_storage();
        let task = Task::new(TaskId(7), "gateway", "10.0.0.1", 443, 600);

        storage.put_task(&task).unwrap();
        assert_eq!(storage.get_task(TaskId(7)).unwrap(), Some(task.clone()));
        assert_eq!(storage.get_tasks().unwrap().len(), 1);

        storage.update_instance_count(TaskId(7), |c| *c = 2).unwrap();
        storage.delete_task(TaskId(7)).unwrap();
        assert!(storage.get_task(TaskId(7)).unwrap().is_none());
        assert_eq!(storage.get_instance_count(TaskId(7)).unwrap(), 0);
    }

    #[test]
    fn test_get_tasks_ordered_by_id() {
        let (storage, _temp) = create_test_storage();
        for id in [10, 2, 33] {
            storage
                .put_task(&Task::new(TaskId(id), "t", "host", 1, 60))
                .unwrap();
        }
        let ids: Vec<u64> = storage.get_tasks().unwrap().iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![2, 10, 33]);
    }

    #[test]
    fn test_intervals_roundtrip_keeps_order() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.get_intervals().unwrap().is_empty());

        let list = vec![
            Interval::new(1, TimeOfDay::new(10, 11).unwrap(), TimeOfDay::new(11, 12).unwrap()),
            Interval::new(2, TimeOfDay::new(1, 1).unwrap(), TimeOfDay::new(2, 2).unwrap()),
        ];
        storage.put_intervals(&list).unwrap();
        assert_eq!(storage.get_intervals().unwrap(), list);
    }

    #[test]
    fn test_update_scheduler_ids_shrinks_and_grows() {
        let (storage, _temp) = create_test_storage();

        storage
            .update_scheduler_ids(|entries| {
                for i in 1..=3 {
                    entries.push(SchedulerIdEntry::new(SchedulerId(i), ts(i as i64)));
                }
            })
            .unwrap();
        assert_eq!(storage.get_scheduler_ids().unwrap().len(), 3);

        // Evict the oldest, as the FIFO ledger does at capacity
        storage
            .update_scheduler_ids(|entries| {
                entries.remove(0);
            })
            .unwrap();
        let entries = storage.get_scheduler_ids().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, SchedulerId(2));
        assert_eq!(storage.get_stats().unwrap().scheduler_id_count, 2);
    }

    #[test]
    fn test_instance_counter_updates() {
        let (storage, _temp) = create_test_storage();
        let task = TaskId(1);

        assert_eq!(storage.get_instance_count(task).unwrap(), 0);
        let after = storage
            .update_instance_count(task, |c| {
                *c += 1;
                *c
            })
            .unwrap();
        assert_eq!(after, 1);
        assert_eq!(storage.get_instance_count(task).unwrap(), 1);

        storage.update_instance_count(TaskId(2), |c| *c = 4).unwrap();
        assert_eq!(storage.reset_all_instance_counts().unwrap(), 2);
        assert_eq!(storage.get_instance_count(task).unwrap(), 0);
        assert_eq!(storage.get_instance_count(TaskId(2)).unwrap(), 0);
    }

    #[test]
    fn test_instance_counter_concurrent_increments() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp_dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        storage.update_instance_count(TaskId(1), |c| *c += 1).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.get_instance_count(TaskId(1)).unwrap(), 200);
    }

    #[test]
    fn test_corrupt_counter_is_reported() {
        let (storage, _temp) = create_test_storage();
        let cf = storage.cf(CF_INSTANCES).unwrap();
        storage
            .db
            .put_cf(&cf, InstanceKey::new(TaskId(7)).to_bytes(), [1u8, 2])
            .unwrap();

        let err = storage.get_instance_count(TaskId(7)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::CorruptCounter {
                expected: 4,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_suspension_state_lifecycle() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.get_suspension_state().unwrap().is_none());

        let state = SuspensionState::new(true, ts(60_000));
        storage.put_suspension_state(&state).unwrap();
        assert_eq!(storage.get_suspension_state().unwrap(), Some(state));

        storage.delete_suspension_state().unwrap();
        assert!(storage.get_suspension_state().unwrap().is_none());
    }

    #[test]
    fn test_suspension_enabled_flag() {
        let (storage, _temp) = create_test_storage();
        assert_eq!(storage.get_suspension_enabled().unwrap(), None);
        storage.put_suspension_enabled(false).unwrap();
        assert_eq!(storage.get_suspension_enabled().unwrap(), Some(false));
        storage.put_suspension_enabled(true).unwrap();
        assert_eq!(storage.get_suspension_enabled().unwrap(), Some(true));
    }

    #[test]
    fn test_stats_and_compact() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_task(&Task::new(TaskId(1), "t", "host", 1, 60))
            .unwrap();
        storage.flush().unwrap();
        storage.compact().unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.task_count, 1);
        assert_eq!(stats.interval_count, 0);
        assert!(stats.disk_usage_bytes > 0);
    }
}
