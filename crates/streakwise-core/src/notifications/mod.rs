//! Adaptive notification engine.
//!
//! - [`preference`]: per-habit timing state and the bounded update step
//! - [`learning`]: applies interactions and aggregates the interaction log
//! - [`scheduler`]: turns preferences and streak context into dispatch requests
//! - [`dispatcher`]: the contract with whatever actually delivers reminders

pub mod dispatcher;
pub mod learning;
pub mod preference;
pub mod scheduler;

pub use dispatcher::{
    drain_pending, ChannelDispatcher, DispatchReceiver, DispatchRequest, NotificationDispatcher,
    NotificationKind, NotificationPayload, ScheduleId,
};
pub use learning::{
    AdaptationOutcome, BehavioralInsights, BehavioralLearningStore, EngagementWindow, ResponsePattern,
    ResponsivenessPattern,
};
pub use preference::{
    Interaction, InteractionKind, InteractionLogEntry, LearningConfig, NotificationPreference,
    TimingAdjustment,
};
pub use scheduler::{AdaptiveScheduler, OptimizationSummary, ScheduledNotification, SchedulerConfig};
