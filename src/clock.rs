//! Where the engine gets "now" from.

use std::sync::{Mutex, PoisonError};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Produces the current local wall-clock time.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The machine's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// `hour:minute:00` on 2024-01-01.
    #[must_use]
    pub fn at(hour: u32, minute: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
        Self::new(date.and_time(time))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }

    pub fn advance_seconds(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;
    use crate::alarm::MinuteKey;

    #[test]
    fn manual_clock_moves_across_midnight() {
        let clock = ManualClock::at(23, 59);
        let before = MinuteKey::from(clock.now());
        clock.advance_minutes(2);
        let after = MinuteKey::from(clock.now());
        assert_eq!(after.day, before.day + 1);
        assert_eq!(after.minute.get(), 1);
    }

    #[test]
    fn seconds_stay_within_the_minute() {
        let clock = ManualClock::at(9, 0);
        clock.advance_seconds(59);
        assert_eq!(clock.now().minute(), 0);
        assert_eq!(clock.now().second(), 59);
    }
}
