//! Storage layer for the probe scheduler.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for tasks, intervals, scheduler ids, instance
//!   counters and engine state
//! - Fixed-width numeric keys so iteration order matches numeric order
//! - Atomic read-modify-write for the shared counters and the id ledger
//!   (write lock + WriteBatch)

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{HistoryKey, InstanceKey, TaskKey};
