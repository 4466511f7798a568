//! Daily suspension interval.
//!
//! An interval is a recurring clock-time window during which probes should
//! not run. An interval whose end is earlier than its start crosses midnight.

use serde::{Deserialize, Serialize};

use crate::time::TimeOfDay;

/// A recurring daily window `[start, end)`.
///
/// `start == end` is the "unset" sentinel and never survives cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Display handle, assigned by position when a list is stored
    #[serde(default)]
    pub id: u32,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Interval {
    pub fn new(id: u32, start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { id, start, end }
    }

    /// Whether the window crosses midnight.
    pub fn is_wraparound(&self) -> bool {
        self.end < self.start
    }

    /// Serialize a list of intervals to JSON bytes
    pub fn list_to_bytes(intervals: &[Interval]) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(intervals)
    }

    /// Deserialize a list of intervals from JSON bytes
    pub fn list_from_bytes(bytes: &[u8]) -> Result<Vec<Interval>, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
