//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - tasks: Task records, rewritten on every transition
//! - intervals: The raw, user-maintained suspension interval list
//! - scheduler_ids: Bounded FIFO ledger of handed-out scheduler ids
//! - instances: Per-task in-flight execution counters
//! - state: Singleton values (suspension verdict, task id sequence)

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for task records
pub const CF_TASKS: &str = "tasks";

/// Column family name for the raw interval list
pub const CF_INTERVALS: &str = "intervals";

/// Column family name for the scheduler id history ledger
pub const CF_SCHEDULER_IDS: &str = "scheduler_ids";

/// Column family name for instance counters
pub const CF_INSTANCES: &str = "instances";

/// Column family name for singleton engine state
pub const CF_STATE: &str = "state";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_TASKS,
    CF_INTERVALS,
    CF_SCHEDULER_IDS,
    CF_INSTANCES,
    CF_STATE,
];

/// Create column family options for small, hot counters
fn counter_options() -> Options {
    let mut opts = Options::default();
    // Values are a few bytes; skip compression work
    opts.set_compression_type(rocksdb::DBCompressionType::None);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_TASKS, Options::default()),
        ColumnFamilyDescriptor::new(CF_INTERVALS, Options::default()),
        ColumnFamilyDescriptor::new(CF_SCHEDULER_IDS, Options::default()),
        ColumnFamilyDescriptor::new(CF_INSTANCES, counter_options()),
        ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
    ]
}
