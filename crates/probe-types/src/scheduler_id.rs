//! Scheduler identity values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one task's current scheduling epoch.
///
/// Alarms carry the id they were armed under, so an alarm from an earlier
/// epoch can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulerId(pub i32);

impl SchedulerId {
    /// Sentinel for "could not allocate".
    pub const INVALID: SchedulerId = SchedulerId(-1);

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl Default for SchedulerId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

/// One record of the scheduler id history ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerIdEntry {
    pub id: SchedulerId,

    /// When the id was handed out
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl SchedulerIdEntry {
    pub fn new(id: SchedulerId, timestamp: DateTime<Utc>) -> Self {
        Self { id, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_invalid() {
        assert!(!SchedulerId::INVALID.is_valid());
        assert!(!SchedulerId(0).is_valid());
        assert!(SchedulerId(42).is_valid());
        assert_eq!(SchedulerId::default(), SchedulerId::INVALID);
    }

    #[test]
    fn test_entry_timestamp_is_integer_millis() {
        let ts = DateTime::from_timestamp_millis(1_706_540_400_000).unwrap();
        let entry = SchedulerIdEntry::new(SchedulerId(7), ts);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"id":7,"timestamp":1706540400000}"#);
    }
}
