//! Per-habit daily trend series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{
    completed_xp_by_day, count_in_window, window_start, AnalyticsConfig, AnalyticsSnapshot,
    TrendDirection, TrendProvider,
};
use crate::streak::run_ending_at;

/// One day of a habit's trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    /// Share of completed days in the rolling window ending on `date`
    pub completion_rate: f64,
    /// Streak length as of `date`
    pub streak: u32,
    pub xp: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitTrend {
    pub habit_id: String,
    pub habit_name: String,
    /// Last rolling rate of the series against the first one
    pub direction: TrendDirection,
    pub points: Vec<TrendPoint>,
}

pub struct TrendAnalyzer {
    config: AnalyticsConfig,
}

impl TrendAnalyzer {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    fn series(&self, snapshot: &AnalyticsSnapshot, habit_id: &str) -> Vec<TrendPoint> {
        let xp_by_day = completed_xp_by_day(snapshot.records_for(habit_id));
        let days: BTreeSet<NaiveDate> = xp_by_day.keys().copied().collect();
        let rolling = self.config.rolling_rate_days;
        let start = window_start(snapshot.as_of, self.config.trend_window_days);

        start
            .iter_days()
            .take_while(|d| *d <= snapshot.as_of)
            .map(|date| {
                let completed = count_in_window(&days, window_start(date, rolling), date);
                TrendPoint {
                    date,
                    completion_rate: completed as f64 / f64::from(rolling),
                    streak: run_ending_at(&days, date),
                    xp: xp_by_day.get(&date).copied().unwrap_or(0),
                }
            })
            .collect()
    }
}

impl TrendProvider for TrendAnalyzer {
    fn trends(&self, snapshot: &AnalyticsSnapshot) -> Vec<HabitTrend> {
        snapshot
            .habits
            .iter()
            .map(|habit| {
                let points = self.series(snapshot, &habit.id);
                let direction = match (points.first(), points.last()) {
                    (Some(first), Some(last)) => TrendDirection::classify(
                        last.completion_rate,
                        first.completion_rate,
                        self.config.trend_hysteresis,
                    ),
                    _ => TrendDirection::Stable,
                };
                HabitTrend {
                    habit_id: habit.id.clone(),
                    habit_name: habit.name.clone(),
                    direction,
                    points,
                }
            })
            .collect()
    }
}
