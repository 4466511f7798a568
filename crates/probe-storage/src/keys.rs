//! Key encoding and decoding for storage layer.
//!
//! Key format: `{prefix}:{number}` with the number zero-padded so that
//! lexicographic order in RocksDB equals numeric order.
//! - `task:{task_id:020}` in the tasks column family
//! - `inst:{task_id:020}` in the instances column family
//! - `sid:{position:06}` in the scheduler id ledger, oldest entry first

use probe_types::TaskId;

use crate::error::StorageError;

/// Parse `{prefix}:{number}` keys.
fn parse_numbered(bytes: &[u8], prefix: &str) -> Result<u64, StorageError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 || parts[0] != prefix {
        return Err(StorageError::Key(format!(
            "Invalid {} key format: {}",
            prefix, s
        )));
    }

    parts[1]
        .parse()
        .map_err(|e| StorageError::Key(format!("Invalid number in {}: {}", s, e)))
}

/// Key for task records
/// Format: task:{task_id:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskKey {
    pub task_id: TaskId,
}

impl TaskKey {
    pub fn new(task_id: TaskId) -> Self {
        Self { task_id }
    }

    /// Encode key to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("task:{:020}", self.task_id.0).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        parse_numbered(bytes, "task").map(|id| Self::new(TaskId(id)))
    }
}

/// Key for per-task instance counters
/// Format: inst:{task_id:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceKey {
    pub task_id: TaskId,
}

impl InstanceKey {
    pub fn new(task_id: TaskId) -> Self {
        Self { task_id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("inst:{:020}", self.task_id.0).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        parse_numbered(bytes, "inst").map(|id| Self::new(TaskId(id)))
    }
}

/// Key for scheduler id ledger rows
/// Format: sid:{position:06}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryKey {
    /// Position in the ledger, 0 = oldest
    pub position: u32,
}

impl HistoryKey {
    pub fn new(position: u32) -> Self {
        Self { position }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("sid:{:06}", self.position).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        parse_numbered(bytes, "sid").map(|pos| Self::new(pos as u32))
    }
}
