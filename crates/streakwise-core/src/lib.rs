//! # Streakwise Core Library
//!
//! The engine behind a habit tracker: streaks, analytics and adaptive
//! reminders. Everything is available through the `streakwise` CLI; any
//! other shell is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Streaks**: pure queries over a habit's completion log, plus the
//!   milestone and percentile tables
//! - **Analytics**: trend, category and productivity analyzers composed by
//!   an aggregator over one read-only snapshot
//! - **Notifications**: a learning loop that tunes each habit's reminder
//!   hour from interaction feedback, and a scheduler that hands requests to
//!   an external dispatcher
//! - **Storage**: SQLite or in-memory persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`StreakCalculator`]: current/longest streak and milestone state
//! - [`AnalyticsAggregator`]: combined analytics report
//! - [`AdaptiveScheduler`]: decides when to remind
//! - [`HabitStore`]: persistence contract, implemented by [`Database`] and [`MemoryStore`]
//! - [`Config`]: engine configuration

pub mod analytics;
pub mod clock;
pub mod error;
pub mod habit;
pub mod logging;
pub mod notifications;
pub mod storage;
pub mod streak;

pub use analytics::{AnalyticsAggregator, AnalyticsConfig, AnalyticsReport, AnalyticsSnapshot, TrendDirection};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ConfigError, CoreError, DispatchError, StoreError, ValidationError};
pub use habit::{CompletionRecord, Difficulty, Habit, HabitCategory, HabitFrequency};
pub use notifications::{
    AdaptiveScheduler, ChannelDispatcher, Interaction, InteractionKind, NotificationDispatcher,
    NotificationKind, SchedulerConfig,
};
pub use storage::{Config, Database, HabitStore, MemoryStore};
pub use streak::{Milestone, StreakAnalytics, StreakCalculator};
