//! Scheduler id allocation.
//!
//! A scheduler id tags every alarm a task arms so that alarms from an older
//! scheduling epoch can be recognized and ignored. Ids are drawn from an
//! [`IdSource`] and checked against a bounded FIFO history of recently
//! handed-out ids.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use probe_types::{SchedulerId, SchedulerIdEntry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Produces candidate scheduler ids.
pub trait IdSource: Send {
    fn next_candidate(&mut self) -> SchedulerId;
}

/// Uniform random ids over `1..=i32::MAX`.
pub struct RandomIdSource {
    rng: StdRng,
}

impl RandomIdSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for RandomIdSource {
    fn next_candidate(&mut self) -> SchedulerId {
        SchedulerId(self.rng.gen_range(1..=i32::MAX))
    }
}

/// Cycles through `low..=high`, wrapping back to `low`.
///
/// A narrow range makes collisions and exhaustion easy to provoke.
pub struct SequentialIdSource {
    low: i32,
    high: i32,
    next: i32,
}

impl SequentialIdSource {
    pub fn new(low: i32, high: i32) -> Self {
        let low = low.max(1);
        let high = high.max(low);
        Self {
            low,
            high,
            next: low,
        }
    }
}

impl IdSource for SequentialIdSource {
    fn next_candidate(&mut self) -> SchedulerId {
        let id = self.next;
        self.next = if id >= self.high { self.low } else { id + 1 };
        SchedulerId(id)
    }
}

/// Bounded FIFO ledger of handed-out ids, oldest first.
#[derive(Debug, Clone)]
pub struct SchedulerIdHistory {
    entries: VecDeque<SchedulerIdEntry>,
    capacity: usize,
}

impl SchedulerIdHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from persisted entries (oldest first), keeping at most `capacity`
    /// of the newest ones.
    pub fn from_entries(capacity: usize, entries: impl IntoIterator<Item = SchedulerIdEntry>) -> Self {
        let mut history = Self::new(capacity);
        for entry in entries {
            history.push(entry);
        }
        history
    }

    pub fn contains(&self, id: SchedulerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Append an entry, evicting the oldest ones past capacity.
    pub fn push(&mut self, entry: SchedulerIdEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchedulerIdEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<SchedulerIdEntry> {
        self.entries.into()
    }
}

/// Draws candidates until one is absent from the history.
pub struct SchedulerIdGenerator {
    source: Mutex<Box<dyn IdSource>>,
    max_attempts: u32,
}

impl SchedulerIdGenerator {
    pub fn new(source: Box<dyn IdSource>, max_attempts: u32) -> Self {
        Self {
            source: Mutex::new(source),
            max_attempts,
        }
    }

    /// Allocate a fresh id and record it in `history`.
    ///
    /// Returns [`SchedulerId::INVALID`] after `max_attempts` colliding
    /// candidates; `history` is then left untouched.
    pub fn allocate(&self, history: &mut SchedulerIdHistory, now: DateTime<Utc>) -> SchedulerId {
        let mut source = self.source.lock().unwrap_or_else(|e| e.into_inner());

        for attempt in 1..=self.max_attempts {
            let candidate = source.next_candidate();
            if !candidate.is_valid() || history.contains(candidate) {
                continue;
            }
            history.push(SchedulerIdEntry::new(candidate, now));
            debug!(scheduler_id = %candidate, attempt, "Allocated scheduler id");
            return candidate;
        }

        warn!(
            attempts = self.max_attempts,
            history = history.len(),
            "Scheduler id allocation exhausted"
        );
        SchedulerId::INVALID
    }
}
