//! Random delay for inexact alarms.
//!
//! Inexact wake-ups may be postponed so that tasks armed for the same
//! instant do not all probe at once.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound on the delay added to an inexact alarm.
///
/// # Example
///
/// ```
/// use probe_scheduler::JitterConfig;
///
/// let config = JitterConfig::new(30);
/// let delay = config.generate_jitter();
/// assert!(delay <= std::time::Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct JitterConfig {
    /// Maximum jitter in seconds (0 = no jitter).
    pub max_jitter_secs: u64,
}

impl JitterConfig {
    pub fn new(max_jitter_secs: u64) -> Self {
        Self { max_jitter_secs }
    }

    pub fn none() -> Self {
        Self { max_jitter_secs: 0 }
    }

    /// A random duration in `0..max_jitter_secs`, or zero when disabled.
    pub fn generate_jitter(&self) -> Duration {
        if self.max_jitter_secs == 0 {
            return Duration::ZERO;
        }
        let max_ms = self.max_jitter_secs.saturating_mul(1000);
        let jitter_ms = rand::thread_rng().gen_range(0..max_ms);
        Duration::from_millis(jitter_ms)
    }

    /// `delay` stretched by a random jitter.
    pub fn apply(&self, delay: Duration) -> Duration {
        delay.saturating_add(self.generate_jitter())
    }

    pub fn is_enabled(&self) -> bool {
        self.max_jitter_secs > 0
    }
}
