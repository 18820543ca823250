//! Per-category insight.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{
    completed_xp_by_day, count_in_window, window_start, AnalyticsConfig, AnalyticsSnapshot,
    CategoryProvider, TrendDirection,
};
use crate::habit::{Habit, HabitCategory};
use crate::streak::run_ending_at;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInsight {
    pub category: HabitCategory,
    pub habit_count: usize,
    /// Completed logs over all logs of the category's habits
    pub completion_rate: f64,
    /// Mean current streak of the category's habits
    pub average_streak: f64,
    pub total_xp: u64,
    /// Recent window against the window before it
    pub trend: TrendDirection,
}

pub struct CategoryAnalyzer {
    config: AnalyticsConfig,
}

impl CategoryAnalyzer {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    fn insight(
        &self,
        snapshot: &AnalyticsSnapshot,
        category: HabitCategory,
        habits: &[&Habit],
    ) -> CategoryInsight {
        let window = self.config.trend_window_days;
        let recent_start = window_start(snapshot.as_of, window);
        let prior_end = recent_start - Duration::days(1);
        let prior_start = window_start(prior_end, window);

        let mut completed = 0usize;
        let mut logged = 0usize;
        let mut total_xp = 0u64;
        let mut streak_sum = 0u64;
        let mut recent = 0usize;
        let mut prior = 0usize;

        for habit in habits {
            let records = snapshot.records_for(&habit.id);
            logged += records.len();
            completed += records.iter().filter(|r| r.completed).count();
            let xp_by_day = completed_xp_by_day(records);
            total_xp += xp_by_day.values().map(|xp| u64::from(*xp)).sum::<u64>();

            let days: BTreeSet<NaiveDate> = xp_by_day.into_keys().collect();
            streak_sum += u64::from(run_ending_at(&days, snapshot.as_of));
            recent += count_in_window(&days, recent_start, snapshot.as_of);
            prior += count_in_window(&days, prior_start, prior_end);
        }

        let habit_days = (habits.len() as f64 * f64::from(window)).max(1.0);
        let trend = TrendDirection::classify(
            recent as f64 / habit_days,
            prior as f64 / habit_days,
            self.config.trend_hysteresis,
        );

        CategoryInsight {
            category,
            habit_count: habits.len(),
            completion_rate: completed as f64 / logged.max(1) as f64,
            average_streak: streak_sum as f64 / habits.len().max(1) as f64,
            total_xp,
            trend,
        }
    }
}

impl CategoryProvider for CategoryAnalyzer {
    /// One insight per category that has at least one habit, in
    /// category order.
    fn categories(&self, snapshot: &AnalyticsSnapshot) -> Vec<CategoryInsight> {
        let mut by_category: BTreeMap<HabitCategory, Vec<&Habit>> = BTreeMap::new();
        for habit in &snapshot.habits {
            by_category.entry(habit.category).or_default().push(habit);
        }

        by_category
            .into_iter()
            .map(|(category, habits)| self.insight(snapshot, category, &habits))
            .collect()
    }
}
