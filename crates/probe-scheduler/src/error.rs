//! Error types for the scheduler crate.
//!
//! Only persistence failures and bad configuration are errors. Allocation
//! exhaustion, invalid intervals, a reached concurrency ceiling and counter
//! underflow are absorbed into task state instead.

use thiserror::Error;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The backing store failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Task not found in the store
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Task settings out of range
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Interval not found in the raw list
    #[error("Interval not found: {0}")]
    IntervalNotFound(u32),
}

#[cfg(feature = "storage")]
impl From<probe_storage::StorageError> for SchedulerError {
    fn from(err: probe_storage::StorageError) -> Self {
        SchedulerError::Storage(err.to_string())
    }
}
