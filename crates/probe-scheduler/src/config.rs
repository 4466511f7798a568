//! Scheduler configuration.
//!
//! Provides configuration for the reschedule engine: the timezone used to
//! read wall-clock time, suspension interval rules, scheduler id allocation
//! limits and alarm timing.

use serde::{Deserialize, Serialize};

use crate::intervals::IntervalRules;
use crate::SchedulerError;

/// Configuration for the reschedule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timezone whose wall clock the suspension intervals refer to
    /// (IANA timezone string, e.g., "Europe/Berlin"). Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Intervals shorter than this are dropped when cleaning.
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: u32,

    /// Accepted intervals must be at least this far apart.
    #[serde(default = "default_min_distance_minutes")]
    pub min_distance_minutes: u32,

    /// Capacity of the scheduler id history ledger.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Candidates drawn before scheduler id allocation gives up.
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: u32,

    /// Delay added to a wake-up that found the task at its concurrency ceiling.
    #[serde(default = "default_busy_backoff_secs")]
    pub busy_backoff_secs: u64,

    /// Run a newly enabled task immediately instead of after one period.
    #[serde(default)]
    pub eager_first_run: bool,

    /// Whether suspension intervals are honored at all.
    #[serde(default = "default_suspension_enabled")]
    pub suspension_enabled: bool,

    /// Maximum delay the alarm runtime may add to inexact wake-ups.
    #[serde(default = "default_inexact_jitter_secs")]
    pub inexact_jitter_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_min_interval_minutes() -> u32 {
    15
}

fn default_min_distance_minutes() -> u32 {
    1
}

fn default_history_capacity() -> usize {
    100
}

fn default_max_id_attempts() -> u32 {
    1000
}

fn default_busy_backoff_secs() -> u64 {
    30
}

fn default_suspension_enabled() -> bool {
    true
}

fn default_inexact_jitter_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            min_interval_minutes: default_min_interval_minutes(),
            min_distance_minutes: default_min_distance_minutes(),
            history_capacity: default_history_capacity(),
            max_id_attempts: default_max_id_attempts(),
            busy_backoff_secs: default_busy_backoff_secs(),
            eager_first_run: false,
            suspension_enabled: default_suspension_enabled(),
            inexact_jitter_secs: default_inexact_jitter_secs(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured timezone string into a chrono_tz::Tz.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` if the timezone string
    /// is not a valid IANA timezone identifier.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.timezone.clone()))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.parse_timezone()?;
        if self.min_interval_minutes >= 24 * 60 {
            return Err(SchedulerError::InvalidConfig(format!(
                "min_interval_minutes must be < 1440, got {}",
                self.min_interval_minutes
            )));
        }
        if self.history_capacity == 0 {
            return Err(SchedulerError::InvalidConfig(
                "history_capacity must be > 0".to_string(),
            ));
        }
        if self.max_id_attempts == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_id_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval cleaning rules derived from this configuration.
    pub fn interval_rules(&self) -> IntervalRules {
        IntervalRules {
            min_duration_minutes: self.min_interval_minutes,
            min_distance_minutes: self.min_distance_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.min_interval_minutes, 15);
        assert_eq!(config.history_capacity, 100);
        assert!(config.suspension_enabled);
        assert!(!config.eager_first_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_timezone_europe_berlin() {
        let config = SchedulerConfig {
            timezone: "Europe/Berlin".to_string(),
            ..Default::default()
        };
        let tz = config.parse_timezone().unwrap();
        assert_eq!(tz.name(), "Europe/Berlin");
    }

    #[test]
    fn test_parse_invalid_timezone() {
        let config = SchedulerConfig {
            timezone: "Invalid/Zone".to_string(),
            ..Default::default()
        };
        match config.validate() {
            Err(SchedulerError::InvalidTimezone(tz)) => assert_eq!(tz, "Invalid/Zone"),
            other => panic!("Expected InvalidTimezone error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = SchedulerConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"timezone":"Asia/Tokyo","eager_first_run":true}"#).unwrap();
        assert_eq!(config.timezone, "Asia/Tokyo");
        assert!(config.eager_first_run);
        assert_eq!(config.min_distance_minutes, 1);
        assert_eq!(config.busy_backoff_secs, 30);
    }
}
