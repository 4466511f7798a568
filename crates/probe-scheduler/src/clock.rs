//! Time source.

use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use probe_types::TimeOfDay;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Wall-clock time of day of `instant` in `tz`.
pub fn local_time_of_day<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> TimeOfDay {
    let local = instant.with_timezone(tz);
    TimeOfDay::from_minute_of_day(local.hour() * 60 + local.minute())
}

/// `instant` with seconds and sub-seconds dropped.
pub fn floor_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        - Duration::seconds(instant.second() as i64)
        - Duration::nanoseconds(instant.nanosecond() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), t0 + Duration::minutes(90));
        clock.set(t0);
        assert_eq!(clock.now(), t0);
    }

    #[test]
    fn test_local_time_of_day_in_zone() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap();
        let tz: chrono_tz::Tz = "Europe/Berlin".parse().unwrap();
        // CET is UTC+1 in January
        assert_eq!(
            local_time_of_day(instant, &tz),
            TimeOfDay::new(23, 30).unwrap()
        );
        assert_eq!(
            local_time_of_day(instant, &chrono_tz::UTC),
            TimeOfDay::new(22, 30).unwrap()
        );
    }

    #[test]
    fn test_floor_to_minute() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 45).unwrap()
            + Duration::milliseconds(250);
        assert_eq!(
            floor_to_minute(instant),
            Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap()
        );
    }
}
