//! Suspension state cache.
//!
//! Holds the last computed "inside a suspension window" verdict. The cache
//! is an explicit value owned by the engine; `None` means the suspension
//! feature is off.

use chrono::{DateTime, Utc};
use probe_types::{SuspensionState, TimeOfDay};
use tracing::info;

use crate::intervals::IntervalSet;

#[derive(Debug, Clone, Default)]
pub struct SuspensionCache {
    state: Option<SuspensionState>,
}

impl SuspensionCache {
    /// An empty cache; the first [`recompute`](Self::recompute) creates the state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate a previously persisted state.
    pub fn from_state(state: Option<SuspensionState>) -> Self {
        Self { state }
    }

    /// Re-evaluate the verdict at `time_of_day`.
    ///
    /// The timestamp only moves when the verdict flips; an unchanged verdict
    /// returns the cached state as is.
    pub fn recompute(
        &mut self,
        set: &IntervalSet,
        time_of_day: TimeOfDay,
        now: DateTime<Utc>,
    ) -> SuspensionState {
        let suspended = set.contains(time_of_day);
        match self.state {
            Some(state) if state.suspended == suspended => state,
            _ => {
                let state = SuspensionState::new(suspended, now);
                info!(suspended, at = %time_of_day, "Suspension verdict changed");
                self.state = Some(state);
                state
            }
        }
    }

    /// The cached verdict. No recomputation; false when the cache is empty.
    pub fn is_active(&self) -> bool {
        self.state.map(|s| s.suspended).unwrap_or(false)
    }

    /// Drop the cached state (feature disabled).
    pub fn clear(&mut self) {
        self.state = None;
    }

    pub fn state(&self) -> Option<&SuspensionState> {
        self.state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::{clean, IntervalRules};
    use chrono::{Duration, TimeZone};
    use probe_types::Interval;

    fn tod(h: u8, m: u8) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    fn night() -> IntervalSet {
        clean(
            &[Interval::new(1, tod(22, 0), tod(6, 0))],
            &IntervalRules::default(),
        )
    }

    #[test]
    fn test_first_recompute_creates_state() {
        let mut cache = SuspensionCache::new();
        assert!(cache.state().is_none());
        assert!(!cache.is_active());

        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let state = cache.recompute(&night(), tod(23, 0), t0);
        assert!(state.suspended);
        assert_eq!(state.timestamp, t0);
        assert!(cache.is_active());
    }

    #[test]
    fn test_unchanged_verdict_keeps_timestamp() {
        let mut cache = SuspensionCache::new();
        let set = night();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        cache.recompute(&set, tod(23, 0), t0);

        let later = t0 + Duration::hours(2);
        let state = cache.recompute(&set, tod(1, 0), later);
        assert!(state.suspended);
        assert_eq!(state.timestamp, t0);
    }

    #[test]
    fn test_flip_updates_timestamp() {
        let mut cache = SuspensionCache::new();
        let set = night();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        cache.recompute(&set, tod(23, 0), t0);

        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();
        let state = cache.recompute(&set, tod(6, 0), t1);
        assert!(!state.suspended);
        assert_eq!(state.timestamp, t1);
        assert!(!cache.is_active());
    }

    #[test]
    fn test_is_active_does_not_recompute() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let cache = SuspensionCache::from_state(Some(SuspensionState::new(true, t0)));
        // Stale but cached: still reported as active
        assert!(cache.is_active());
    }

    #[test]
    fn test_clear() {
        let mut cache = SuspensionCache::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        cache.recompute(&night(), tod(23, 0), t0);
        cache.clear();
        assert!(cache.state().is_none());
        assert!(!cache.is_active());
    }
}
