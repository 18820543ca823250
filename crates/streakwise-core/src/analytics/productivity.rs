//! Productivity score per period.
//!
//! The score mixes how many habit-days were completed with how many days
//! saw any completion at all:
//!
//! `score = 100 * (0.7 * completion_rate + 0.3 * consistency)`

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{completed_xp_by_day, window_start, AnalyticsSnapshot, ProductivityProvider, TrendDirection};

const COMPLETION_WEIGHT: f64 = 0.7;
const CONSISTENCY_WEIGHT: f64 = 0.3;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductivityPeriod {
    Week,
    Month,
    Quarter,
    Year,
}

impl ProductivityPeriod {
    pub const ALL: [ProductivityPeriod; 4] = [
        ProductivityPeriod::Week,
        ProductivityPeriod::Month,
        ProductivityPeriod::Quarter,
        ProductivityPeriod::Year,
    ];

    pub fn days(&self) -> u32 {
        match self {
            ProductivityPeriod::Week => 7,
            ProductivityPeriod::Month => 30,
            ProductivityPeriod::Quarter => 90,
            ProductivityPeriod::Year => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductivityPeriod::Week => "week",
            ProductivityPeriod::Month => "month",
            ProductivityPeriod::Quarter => "quarter",
            ProductivityPeriod::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityMetrics {
    pub period: ProductivityPeriod,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub score: f64,
    pub completion_rate: f64,
    /// Share of days in the period with at least one completion
    pub consistency: f64,
    /// Score against the same-length period right before
    pub trend: TrendDirection,
    pub total_completions: usize,
    pub total_xp: u64,
    /// Weekday with the most completed habit-days, if any
    pub best_weekday: Option<Weekday>,
}

/// Raw counts over one window.
struct WindowTally {
    completed_habit_days: usize,
    active_days: usize,
    xp: u64,
    by_weekday: [usize; 7],
}

pub struct ProductivityAnalyzer {
    hysteresis: f64,
}

impl ProductivityAnalyzer {
    pub fn new(hysteresis: f64) -> Self {
        Self { hysteresis }
    }

    fn tally(snapshot: &AnalyticsSnapshot, start: NaiveDate, end: NaiveDate) -> WindowTally {
        let mut tally = WindowTally {
            completed_habit_days: 0,
            active_days: 0,
            xp: 0,
            by_weekday: [0; 7],
        };
        let mut active = BTreeSet::new();

        for habit in &snapshot.habits {
            let xp_by_day = completed_xp_by_day(snapshot.records_for(&habit.id));
            for (date, xp) in xp_by_day.range(start..=end) {
                tally.completed_habit_days += 1;
                tally.xp += u64::from(*xp);
                tally.by_weekday[date.weekday().num_days_from_monday() as usize] += 1;
                active.insert(*date);
            }
        }
        tally.active_days = active.len();
        tally
    }

    fn score(&self, tally: &WindowTally, habits: usize, days: u32) -> (f64, f64, f64) {
        let completion_rate =
            tally.completed_habit_days as f64 / (habits.max(1) as f64 * f64::from(days));
        let consistency = tally.active_days as f64 / f64::from(days);
        let score = 100.0 * (COMPLETION_WEIGHT * completion_rate + CONSISTENCY_WEIGHT * consistency);
        (score, completion_rate, consistency)
    }
}

impl ProductivityProvider for ProductivityAnalyzer {
    fn productivity(&self, snapshot: &AnalyticsSnapshot, period: ProductivityPeriod) -> ProductivityMetrics {
        let days = period.days();
        let end = snapshot.as_of;
        let start = window_start(end, days);
        let prev_end = start - Duration::days(1);
        let prev_start = window_start(prev_end, days);
        let habits = snapshot.habits.len();

        let current = Self::tally(snapshot, start, end);
        let previous = Self::tally(snapshot, prev_start, prev_end);
        let (score, completion_rate, consistency) = self.score(&current, habits, days);
        let (prev_score, _, _) = self.score(&previous, habits, days);

        // ties go to the earlier weekday
        let best_weekday = WEEKDAYS
            .iter()
            .zip(current.by_weekday)
            .filter(|(_, count)| *count > 0)
            .fold(None::<(Weekday, usize)>, |best, (&day, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((day, count)),
            })
            .map(|(day, _)| day);

        ProductivityMetrics {
            period,
            start,
            end,
            score,
            completion_rate,
            consistency,
            trend: TrendDirection::classify(score, prev_score, self.hysteresis),
            total_completions: current.completed_habit_days,
            total_xp: current.xp,
            best_weekday,
        }
    }
}
