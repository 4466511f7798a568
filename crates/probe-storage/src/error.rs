//! Error type for the probe storage layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// A key in a column family did not decode
    #[error("Key error: {0}")]
    Key(String),

    /// A JSON record did not round-trip
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A fixed-width counter value had the wrong length
    #[error("Corrupt counter {name}: expected {expected} bytes, found {found}")]
    CorruptCounter {
        name: String,
        expected: usize,
        found: usize,
    },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
