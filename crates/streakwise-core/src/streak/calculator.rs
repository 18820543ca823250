//! Streak calculator.
//!
//! Pure queries over one habit's completion log. Missing or empty logs
//! never error; every query falls back to zero/none.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::milestone::{Milestone, MilestoneTable, PercentileTable};
use super::{completed_days, longest_streak, run_ending_at};
use crate::clock::Clock;
use crate::habit::CompletionRecord;

/// One day in a streak calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakDayData {
    pub date: NaiveDate,
    pub completed: bool,
    /// 1.0 when completed, 0.0 otherwise. Reserved for partial completion.
    pub intensity: f64,
}

/// Everything the presentation layer shows about a habit's streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakAnalytics {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub current_milestone: Option<Milestone>,
    pub next_milestone: Milestone,
    pub progress_to_next: f64,
    pub percentile: f64,
}

/// A streak that ends yesterday and will break unless today is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRisk {
    pub streak_at_stake: u32,
}

/// Computes streaks, calendars and milestone state.
pub struct StreakCalculator {
    clock: Arc<dyn Clock>,
    milestones: MilestoneTable,
    percentiles: PercentileTable,
}

impl StreakCalculator {
    /// Calculator with the default milestone and percentile tables.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_tables(clock, MilestoneTable::default(), PercentileTable::default())
    }

    pub fn with_tables(
        clock: Arc<dyn Clock>,
        milestones: MilestoneTable,
        percentiles: PercentileTable,
    ) -> Self {
        Self {
            clock,
            milestones,
            percentiles,
        }
    }

    pub fn milestones(&self) -> &MilestoneTable {
        &self.milestones
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Consecutive completed days ending today.
    pub fn current_streak(&self, records: &[CompletionRecord]) -> u32 {
        self.current_streak_at(records, self.today())
    }

    /// Consecutive completed days ending on `today`. A gap on any earlier
    /// day cuts the run there.
    pub fn current_streak_at(&self, records: &[CompletionRecord], today: NaiveDate) -> u32 {
        super::current_streak_at(records, today)
    }

    pub fn longest_streak(&self, records: &[CompletionRecord]) -> u32 {
        longest_streak(records)
    }

    /// Calendar of `days + 1` entries, oldest first, ending today.
    pub fn streak_day_data(&self, records: &[CompletionRecord], days: u32) -> Vec<StreakDayData> {
        self.streak_day_data_at(records, days, self.today())
    }

    pub fn streak_day_data_at(
        &self,
        records: &[CompletionRecord],
        days: u32,
        today: NaiveDate,
    ) -> Vec<StreakDayData> {
        let completed = completed_days(records);
        (0..=days)
            .rev()
            .filter_map(|back| today.checked_sub_days(chrono::Days::new(u64::from(back))))
            .map(|date| {
                let done = completed.contains(&date);
                StreakDayData {
                    date,
                    completed: done,
                    intensity: if done { 1.0 } else { 0.0 },
                }
            })
            .collect()
    }

    /// The milestone just crossed, if the current streak sits exactly on a
    /// threshold that `previous_streak` was below.
    pub fn check_for_new_milestone(
        &self,
        records: &[CompletionRecord],
        previous_streak: u32,
    ) -> Option<&Milestone> {
        let current = self.current_streak(records);
        self.milestones
            .exact(current)
            .filter(|m| previous_streak < m.threshold)
    }

    pub fn current_milestone(&self, records: &[CompletionRecord]) -> Option<&Milestone> {
        self.milestones.reached(self.current_streak(records))
    }

    pub fn next_milestone(&self, records: &[CompletionRecord]) -> &Milestone {
        self.milestones.upcoming(self.current_streak(records))
    }

    /// Fraction of the way from the current milestone to the next, in [0, 1].
    pub fn progress_to_next_milestone(&self, records: &[CompletionRecord]) -> f64 {
        self.progress_for(self.current_streak(records))
    }

    /// Days of further completion needed to reach the next milestone.
    pub fn days_until_next_milestone(&self, records: &[CompletionRecord]) -> u32 {
        let current = self.current_streak(records);
        self.milestones.upcoming(current).threshold.saturating_sub(current)
    }

    /// Whether a run ending yesterday is about to break.
    pub fn streak_at_risk(&self, records: &[CompletionRecord]) -> Option<StreakRisk> {
        let today = self.today();
        let days = completed_days(records);
        if days.contains(&today) {
            return None;
        }
        let yesterday = today.pred_opt()?;
        match run_ending_at(&days, yesterday) {
            0 => None,
            streak_at_stake => Some(StreakRisk { streak_at_stake }),
        }
    }

    pub fn streak_analytics(&self, records: &[CompletionRecord]) -> StreakAnalytics {
        let current = self.current_streak(records);
        let longest = self.longest_streak(records);

        tracing::debug!(current, longest, "computed streak analytics");

        StreakAnalytics {
            current_streak: current,
            longest_streak: longest,
            current_milestone: self.milestones.reached(current).cloned(),
            next_milestone: self.milestones.upcoming(current).clone(),
            progress_to_next: self.progress_for(current),
            percentile: self.percentiles.percentile(current),
        }
    }

    fn progress_for(&self, current: u32) -> f64 {
        let floor = self.milestones.reached(current).map_or(0, |m| m.threshold);
        let ceiling = self.milestones.upcoming(current).threshold;
        if ceiling <= floor {
            return 1.0;
        }
        let progress = f64::from(current - floor) / f64::from(ceiling - floor);
        progress.clamp(0.0, 1.0)
    }
}
