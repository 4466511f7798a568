//! Wall-clock time of day at minute resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Number of minutes in one day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A time of day, `hour` 0-23 and `minute` 0-59.
///
/// Ordering follows the clock: 00:00 is the smallest value, 23:59 the largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeOfDayRepr")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

#[derive(Deserialize)]
struct TimeOfDayRepr {
    hour: u8,
    minute: u8,
}

impl TryFrom<TimeOfDayRepr> for TimeOfDay {
    type Error = ProbeError;

    fn try_from(repr: TimeOfDayRepr) -> Result<Self, Self::Error> {
        TimeOfDay::new(repr.hour, repr.minute)
    }
}

impl TimeOfDay {
    /// Midnight, 00:00.
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

    /// Create a time of day, rejecting out-of-range components.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ProbeError> {
        if hour > 23 || minute > 59 {
            return Err(ProbeError::InvalidTime(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    /// Build from minutes since midnight. Values past one day wrap around.
    pub fn from_minute_of_day(minutes: u32) -> Self {
        let minutes = minutes % MINUTES_PER_DAY as u32;
        Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes elapsed since midnight (0..1440).
    pub fn minute_of_day(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    /// Forward distance in minutes from `self` to `other`, wrapping past midnight.
    ///
    /// Always in `0..1440`; equal times are zero minutes apart.
    pub fn minutes_until(&self, other: TimeOfDay) -> u16 {
        let from = self.minute_of_day() as i32;
        let to = other.minute_of_day() as i32;
        (to - from).rem_euclid(MINUTES_PER_DAY as i32) as u16
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ProbeError;

    /// Parse `HH:MM` (a single-digit hour is accepted).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ProbeError::InvalidTime(s.to_string()))?;
        let hour: u8 = hour
            .parse()
            .map_err(|_| ProbeError::InvalidTime(s.to_string()))?;
        let minute: u8 = minute
            .parse()
            .map_err(|_| ProbeError::InvalidTime(s.to_string()))?;
        TimeOfDay::new(hour, minute)
    }
}
