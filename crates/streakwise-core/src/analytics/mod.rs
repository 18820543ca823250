//! Analytics over the habit/completion snapshot.
//!
//! Three independent sub-analyzers sit behind provider traits:
//! - **Trend**: per-habit daily series of completion rate, streak and XP
//! - **Category**: per-category completion rate, streaks, XP and trend tag
//! - **Productivity**: score and trend over week/month/quarter/year
//!
//! [`AnalyticsAggregator`] runs them over the same read-only
//! [`AnalyticsSnapshot`] and adds a few top-level counts.

mod category;
mod productivity;
mod trend;

pub use category::{CategoryAnalyzer, CategoryInsight};
pub use productivity::{ProductivityAnalyzer, ProductivityMetrics, ProductivityPeriod};
pub use trend::{HabitTrend, TrendAnalyzer, TrendPoint};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::ValidationError;
use crate::habit::{CompletionRecord, Habit};
use crate::storage::{read_or_default, HabitStore};

/// Longest window any analytics setting may ask for.
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Analytics windows and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Days covered by trend series and by each category trend window
    pub trend_window_days: u32,
    /// Days in the rolling completion rate of a trend point
    pub rolling_rate_days: u32,
    /// Relative change needed before a trend counts as improving/declining
    pub trend_hysteresis: f64,
    /// A habit completed within this many days counts as active
    pub active_window_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trend_window_days: 30,
            rolling_rate_days: 7,
            trend_hysteresis: 0.1,
            active_window_days: 7,
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let windows = [
            ("trend_window_days", self.trend_window_days),
            ("rolling_rate_days", self.rolling_rate_days),
            ("active_window_days", self.active_window_days),
        ];
        for (field, days) in windows {
            if days == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be at least 1 day".into(),
                });
            }
            if days > MAX_WINDOW_DAYS {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    message: format!("{days} exceeds {MAX_WINDOW_DAYS} days"),
                });
            }
        }
        if !(0.0..1.0).contains(&self.trend_hysteresis) {
            return Err(ValidationError::InvalidValue {
                field: "trend_hysteresis".into(),
                message: format!("{} outside [0, 1)", self.trend_hysteresis),
            });
        }
        Ok(())
    }
}

/// Direction of a metric between two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

impl TrendDirection {
    /// Compare `recent` against `prior` with a relative dead band of
    /// `hysteresis` on either side.
    pub fn classify(recent: f64, prior: f64, hysteresis: f64) -> Self {
        if prior <= 0.0 {
            return if recent > 0.0 {
                TrendDirection::Improving
            } else {
                TrendDirection::Stable
            };
        }
        if recent > prior * (1.0 + hysteresis) {
            TrendDirection::Improving
        } else if recent < prior * (1.0 - hysteresis) {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }
}

/// Read-only view of habits and their logs as of one day.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsSnapshot {
    pub as_of: NaiveDate,
    pub habits: Vec<Habit>,
    records: HashMap<String, Vec<CompletionRecord>>,
}

impl AnalyticsSnapshot {
    pub fn new(as_of: NaiveDate, habits: Vec<Habit>, completions: Vec<CompletionRecord>) -> Self {
        let mut records: HashMap<String, Vec<CompletionRecord>> = HashMap::new();
        for record in completions {
            records.entry(record.habit_id.clone()).or_default().push(record);
        }
        Self {
            as_of,
            habits,
            records,
        }
    }

    /// Snapshot the store. Failed reads become empty collections.
    pub fn load(store: &dyn HabitStore, as_of: NaiveDate) -> Self {
        let habits = read_or_default("habits", store.habits());
        let completions = read_or_default("completions", store.all_completions());
        Self::new(as_of, habits, completions)
    }

    pub fn records_for(&self, habit_id: &str) -> &[CompletionRecord] {
        self.records.get(habit_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Records of habits that are part of the snapshot.
    pub fn all_records(&self) -> impl Iterator<Item = &CompletionRecord> {
        self.habits.iter().flat_map(|h| self.records_for(&h.id))
    }
}

/// Completed days of one habit with the XP earned on each. Duplicate
/// records on a day count once, at their highest XP.
pub(crate) fn completed_xp_by_day(records: &[CompletionRecord]) -> BTreeMap<NaiveDate, u32> {
    let mut days = BTreeMap::new();
    for record in records.iter().filter(|r| r.completed) {
        let xp = days.entry(record.date).or_insert(0u32);
        *xp = (*xp).max(record.xp_earned);
    }
    days
}

/// First day of a `days`-long window ending on `end`.
pub(crate) fn window_start(end: NaiveDate, days: u32) -> NaiveDate {
    end.checked_sub_signed(Duration::days(i64::from(days.max(1)) - 1))
        .unwrap_or(NaiveDate::MIN)
}

pub(crate) fn count_in_window(days: &BTreeSet<NaiveDate>, start: NaiveDate, end: NaiveDate) -> usize {
    if start > end {
        return 0;
    }
    days.range(start..=end).count()
}

pub trait TrendProvider: Send + Sync {
    fn trends(&self, snapshot: &AnalyticsSnapshot) -> Vec<HabitTrend>;
}

pub trait CategoryProvider: Send + Sync {
    fn categories(&self, snapshot: &AnalyticsSnapshot) -> Vec<CategoryInsight>;
}

pub trait ProductivityProvider: Send + Sync {
    fn productivity(&self, snapshot: &AnalyticsSnapshot, period: ProductivityPeriod) -> ProductivityMetrics;
}

/// Combined output of all analyzers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub total_habits: usize,
    pub active_habits: usize,
    pub overall_completion_rate: f64,
    pub trends: Vec<HabitTrend>,
    pub categories: Vec<CategoryInsight>,
    pub productivity: Vec<ProductivityMetrics>,
}

/// Composes the three providers into one report.
pub struct AnalyticsAggregator {
    trend: Box<dyn TrendProvider>,
    category: Box<dyn CategoryProvider>,
    productivity: Box<dyn ProductivityProvider>,
    config: AnalyticsConfig,
}

impl AnalyticsAggregator {
    pub fn new(
        trend: Box<dyn TrendProvider>,
        category: Box<dyn CategoryProvider>,
        productivity: Box<dyn ProductivityProvider>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            trend,
            category,
            productivity,
            config,
        }
    }

    /// Aggregator wired to the built-in analyzers.
    pub fn with_config(config: AnalyticsConfig) -> Self {
        Self::new(
            Box::new(TrendAnalyzer::new(config.clone())),
            Box::new(CategoryAnalyzer::new(config.clone())),
            Box::new(ProductivityAnalyzer::new(config.trend_hysteresis)),
            config,
        )
    }

    /// Run every analyzer over `snapshot`. The three providers run on
    /// scoped threads; they only share the snapshot by reference.
    pub fn report(&self, snapshot: &AnalyticsSnapshot, generated_at: DateTime<Utc>) -> AnalyticsReport {
        let (trends, categories, productivity) = std::thread::scope(|scope| {
            let trends = scope.spawn(|| self.trend.trends(snapshot));
            let categories = scope.spawn(|| self.category.categories(snapshot));
            let productivity = scope.spawn(|| {
                ProductivityPeriod::ALL
                    .iter()
                    .map(|&period| self.productivity.productivity(snapshot, period))
                    .collect::<Vec<_>>()
            });
            (
                join_or_default("trend", trends),
                join_or_default("category", categories),
                join_or_default("productivity", productivity),
            )
        });

        let (completed, total) = snapshot
            .all_records()
            .fold((0usize, 0usize), |(done, all), r| (done + usize::from(r.completed), all + 1));

        let active_since = window_start(snapshot.as_of, self.config.active_window_days);
        let active_habits = snapshot
            .habits
            .iter()
            .filter(|h| {
                snapshot
                    .records_for(&h.id)
                    .iter()
                    .any(|r| r.completed && r.date >= active_since && r.date <= snapshot.as_of)
            })
            .count();

        tracing::debug!(
            habits = snapshot.habits.len(),
            active_habits,
            records = total,
            "analytics report built"
        );

        AnalyticsReport {
            generated_at,
            as_of: snapshot.as_of,
            total_habits: snapshot.habits.len(),
            active_habits,
            overall_completion_rate: completed as f64 / total.max(1) as f64,
            trends,
            categories,
            productivity,
        }
    }
}

fn join_or_default<T: Default>(name: &str, handle: std::thread::ScopedJoinHandle<'_, T>) -> T {
    handle.join().unwrap_or_else(|_| {
        tracing::warn!(analyzer = name, "analyzer panicked, section left empty");
        T::default()
    })
}
