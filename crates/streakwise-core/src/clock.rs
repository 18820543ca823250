//! Injectable time source.
//!
//! Everything that asks "what day is it" goes through a [`Clock`], so tests
//! can pin time with [`FixedClock`]. Day boundaries are UTC calendar days.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::RwLock;

/// Supplies "now" and day-boundary arithmetic.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Midnight at the start of `date`.
    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|| self.now())
    }

    /// Signed number of calendar days from `a` to `b`.
    fn days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        (b - a).num_days()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Clock pinned to `hour`:00 UTC on `date`.
    pub fn at(date: NaiveDate, hour: u32) -> Self {
        let now = date
            .and_hms_opt(hour.min(23), 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(Utc::now);
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fixed_clock_reports_pinned_day() {
        let clock = FixedClock::at(date(2024, 3, 10), 14);
        assert_eq!(clock.today(), date(2024, 3, 10));
        assert_eq!(clock.now().hour(), 14);
    }

    #[test]
    fn advance_crosses_midnight() {
        let clock = FixedClock::at(date(2024, 3, 10), 23);
        clock.advance(Duration::hours(2));
        assert_eq!(clock.today(), date(2024, 3, 11));
    }

    #[test]
    fn day_arithmetic() {
        let clock = FixedClock::at(date(2024, 3, 10), 9);
        assert_eq!(clock.days_between(date(2024, 3, 1), date(2024, 3, 10)), 9);
        assert_eq!(clock.days_between(date(2024, 3, 10), date(2024, 3, 1)), -9);
        assert_eq!(clock.start_of_day(date(2024, 3, 10)).hour(), 0);
    }
}
