//! Streak computation over a habit's completion log.
//!
//! The free functions here are shared by [`StreakCalculator`] and the
//! analytics sub-analyzers. They take the raw, possibly duplicated records
//! and deduplicate by calendar day before counting.

mod calculator;
mod milestone;

pub use calculator::{StreakAnalytics, StreakCalculator, StreakDayData, StreakRisk};
pub use milestone::{CelebrationTier, Milestone, MilestoneTable, PercentileBucket, PercentileTable};

use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;

use crate::habit::CompletionRecord;

/// Distinct days that carry at least one completed record, ascending.
pub fn completed_days(records: &[CompletionRecord]) -> BTreeSet<NaiveDate> {
    records
        .iter()
        .filter(|r| r.completed)
        .map(|r| r.date)
        .collect()
}

/// Consecutive completed days ending on `day` (0 if `day` itself is missing).
pub fn current_streak_at(records: &[CompletionRecord], day: NaiveDate) -> u32 {
    run_ending_at(&completed_days(records), day)
}

/// Longest run of consecutive completed days anywhere in the log.
pub fn longest_streak(records: &[CompletionRecord]) -> u32 {
    let days = completed_days(records);
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for day in days {
        run = match previous {
            Some(prev) if day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    longest
}

pub(crate) fn run_ending_at(days: &BTreeSet<NaiveDate>, day: NaiveDate) -> u32 {
    let mut streak = 0u32;
    let mut cursor = day;
    while days.contains(&cursor) {
        streak += 1;
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::{Habit, HabitCategory};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap() - Duration::days(offset)
    }

    fn records(offsets: &[i64]) -> Vec<CompletionRecord> {
        let habit = Habit::new("Stretch", HabitCategory::Health).with_id("h");
        offsets
            .iter()
            .map(|&o| CompletionRecord::completed_on(&habit, day(o)))
            .collect()
    }

    #[test]
    fn duplicate_days_count_once() {
        let log = records(&[0, 0, 1, 1, 1]);
        assert_eq!(completed_days(&log).len(), 2);
        assert_eq!(current_streak_at(&log, day(0)), 2);
        assert_eq!(longest_streak(&log), 2);
    }

    #[test]
    fn incomplete_records_are_ignored() {
        let habit = Habit::new("Stretch", HabitCategory::Health).with_id("h");
        let log = vec![
            CompletionRecord::completed_on(&habit, day(1)),
            CompletionRecord::missed_on(&habit, day(0)),
        ];
        assert_eq!(current_streak_at(&log, day(0)), 0);
        assert_eq!(current_streak_at(&log, day(1)), 1);
    }

    #[test]
    fn longest_streak_takes_max_run() {
        // 3-day run ending today, 5-day run two weeks earlier
        let log = records(&[0, 1, 2, 14, 15, 16, 17, 18]);
        assert_eq!(longest_streak(&log), 5);
    }

    #[test]
    fn empty_log_is_zero() {
        assert_eq!(longest_streak(&[]), 0);
        assert_eq!(current_streak_at(&[], day(0)), 0);
    }
}
