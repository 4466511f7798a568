//! Cached suspension verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known "inside a suspension window" verdict and when it last flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionState {
    pub suspended: bool,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl SuspensionState {
    pub fn new(suspended: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            suspended,
            timestamp,
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
