//! Daily suspension interval algebra.
//!
//! Raw intervals come from the user (manual edits or bulk import) and may be
//! degenerate, too short, or overlapping. [`clean`] turns them into an
//! [`IntervalSet`], the only form the rest of the engine consumes.
//!
//! Intervals are half-open `[start, end)` at minute resolution. An interval
//! whose end is earlier than its start wraps past midnight, so overlap is
//! decided on circular arcs of the 1440-minute day.

use probe_types::{Interval, TimeOfDay, MINUTES_PER_DAY};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DAY: u32 = MINUTES_PER_DAY as u32;

/// Thresholds applied by [`clean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRules {
    /// Intervals shorter than this are dropped.
    pub min_duration_minutes: u32,
    /// Minimum gap between the end of one accepted interval and the start
    /// of the next. Zero allows back-to-back windows.
    pub min_distance_minutes: u32,
}

impl Default for IntervalRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 15,
            min_distance_minutes: 1,
        }
    }
}

/// False for the `start == end` "unset" sentinel.
pub fn is_structurally_valid(interval: &Interval) -> bool {
    interval.start != interval.end
}

/// Length in minutes, counting across midnight for wraparound intervals.
pub fn duration_minutes(interval: &Interval) -> u32 {
    interval.start.minutes_until(interval.end) as u32
}

/// Whether `point` lies on the arc that starts at `start` and runs `len`
/// minutes forward.
fn arc_contains(start: TimeOfDay, len: u32, point: TimeOfDay) -> bool {
    len >= DAY || (start.minutes_until(point) as u32) < len
}

/// Whether two intervals overlap or sit closer than `distance` minutes.
fn conflicts(a: &Interval, b: &Interval, distance: u32) -> bool {
    arc_contains(a.start, duration_minutes(a) + distance, b.start)
        || arc_contains(b.start, duration_minutes(b) + distance, a.start)
}

/// Build the cleaned interval set from a raw list.
///
/// Degenerate and short intervals are dropped first. The rest are walked in
/// start order, with wraparound intervals counted as starting the previous
/// evening and therefore walked first. Insertion order breaks ties. An
/// interval that overlaps or crowds an already accepted one is discarded
/// whole. The result is sorted by start, and cleaning it again is a no-op.
pub fn clean(raw: &[Interval], rules: &IntervalRules) -> IntervalSet {
    let mut candidates: Vec<Interval> = raw
        .iter()
        .filter(|interval| {
            if !is_structurally_valid(interval) {
                debug!(interval = %interval, "Dropping unset interval");
                return false;
            }
            if duration_minutes(interval) < rules.min_duration_minutes {
                debug!(
                    interval = %interval,
                    min = rules.min_duration_minutes,
                    "Dropping interval shorter than minimum"
                );
                return false;
            }
            true
        })
        .copied()
        .collect();

    candidates.sort_by_key(|interval| (!interval.is_wraparound(), interval.start));

    let mut accepted: Vec<Interval> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let crowded = accepted
            .iter()
            .any(|kept| conflicts(kept, &candidate, rules.min_distance_minutes));
        if crowded {
            debug!(interval = %candidate, "Dropping interval that overlaps an earlier one");
        } else {
            accepted.push(candidate);
        }
    }

    accepted.sort_by_key(|interval| interval.start);
    IntervalSet { intervals: accepted }
}

/// Non-overlapping suspension windows sorted by start.
///
/// Only [`clean`] builds a non-empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether `now` falls inside any window.
    pub fn contains(&self, now: TimeOfDay) -> bool {
        self.window_containing(now).is_some()
    }

    /// The window `now` falls inside, if any.
    pub fn window_containing(&self, now: TimeOfDay) -> Option<&Interval> {
        self.intervals
            .iter()
            .find(|interval| arc_contains(interval.start, duration_minutes(interval), now))
    }

    /// End of the window containing `now`.
    pub fn window_end(&self, now: TimeOfDay) -> Option<TimeOfDay> {
        self.window_containing(now).map(|interval| interval.end)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
