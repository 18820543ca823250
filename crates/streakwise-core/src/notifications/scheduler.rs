//! Adaptive notification scheduler.
//!
//! Decides when to ask the dispatcher for a reminder. The base schedule is
//! the learned preferred hour; streak context can replace it with a
//! recovery nudge or a milestone celebration. Each (habit, kind) pair has
//! at most one live schedule; live schedules are kept in the [`HabitStore`]
//! so a later process can replace or cancel them.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::dispatcher::{NotificationDispatcher, NotificationKind, NotificationPayload, ScheduleId};
use super::learning::{AdaptationOutcome, BehavioralInsights, BehavioralLearningStore, ResponsePattern};
use super::preference::{Interaction, LearningConfig, NotificationPreference};
use crate::clock::Clock;
use crate::error::{CoreError, ValidationError};
use crate::habit::{CompletionRecord, Habit};
use crate::storage::{read_or_default, Config, HabitStore};
use crate::streak::{completed_days, run_ending_at, Milestone, StreakCalculator};

/// Scheduler switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// When false every schedule call is a no-op; cancels still work
    pub enabled: bool,
    /// Hour of the streak recovery nudge
    pub recovery_hour: u8,
    /// Announce a milestone this many days ahead
    pub milestone_lookahead_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recovery_hour: 20,
            milestone_lookahead_days: 2,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recovery_hour > 23 {
            return Err(ValidationError::InvalidHour(u32::from(self.recovery_hour)));
        }
        Ok(())
    }
}

/// A schedule request the dispatcher accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub id: ScheduleId,
    pub habit_id: String,
    pub kind: NotificationKind,
    pub hour: u8,
    pub payload: NotificationPayload,
}

/// Result of one frequency optimization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub examined: usize,
    pub increased: usize,
    pub decreased: usize,
    pub unchanged: usize,
}

/// Clears a batch-job flag when the run ends, even on panic.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AdaptiveScheduler {
    learning: BehavioralLearningStore,
    streaks: StreakCalculator,
    dispatcher: Arc<dyn NotificationDispatcher>,
    store: Arc<dyn HabitStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    /// Serializes read-cancel-write sequences on the stored schedules.
    slots: Mutex<()>,
    optimizing: AtomicBool,
    sweeping: AtomicBool,
}

impl AdaptiveScheduler {
    /// Scheduler with the default milestone and percentile tables.
    pub fn new(
        store: Arc<dyn HabitStore>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        learning: LearningConfig,
        config: SchedulerConfig,
    ) -> Self {
        let streaks = StreakCalculator::new(clock.clone());
        Self::with_streaks(store, clock, dispatcher, learning, config, streaks)
    }

    pub fn with_streaks(
        store: Arc<dyn HabitStore>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        learning: LearningConfig,
        config: SchedulerConfig,
        streaks: StreakCalculator,
    ) -> Self {
        Self {
            learning: BehavioralLearningStore::new(store.clone(), clock.clone(), learning),
            streaks,
            dispatcher,
            store,
            clock,
            config,
            slots: Mutex::new(()),
            optimizing: AtomicBool::new(false),
            sweeping: AtomicBool::new(false),
        }
    }

    /// Build from a loaded [`Config`]; fails if the config does not validate.
    pub fn from_config(
        store: Arc<dyn HabitStore>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: &Config,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let (milestones, percentiles) = config.streak.tables()?;
        let streaks = StreakCalculator::with_tables(clock.clone(), milestones, percentiles);
        Ok(Self::with_streaks(
            store,
            clock,
            dispatcher,
            config.learning.clone(),
            config.notifications.clone(),
            streaks,
        ))
    }

    pub fn learning(&self) -> &BehavioralLearningStore {
        &self.learning
    }

    pub fn streaks(&self) -> &StreakCalculator {
        &self.streaks
    }

    fn records(&self, habit_id: &str) -> Vec<CompletionRecord> {
        read_or_default("completions", self.store.completions(habit_id))
    }

    /// Feed one interaction into the learning store. When the preferred hour
    /// moves, a live reminder is moved with it.
    pub fn adapt_to_user_behavior(
        &self,
        habit_id: &str,
        interaction: &Interaction,
    ) -> Result<AdaptationOutcome, CoreError> {
        let outcome = self.learning.adapt(habit_id, interaction)?;
        if outcome.timing_adjustment.is_some() && self.is_scheduled(habit_id, NotificationKind::Reminder) {
            if let Some(habit) = read_or_default("habit", self.store.habit(habit_id)) {
                self.schedule_reminder(&habit, &outcome.preference);
            }
        }
        Ok(outcome)
    }

    pub fn analyze_user_response_patterns(&self, habit_id: &str) -> ResponsePattern {
        self.learning.analyze_response_patterns(habit_id)
    }

    pub fn get_behavioral_insights(&self, habit_id: &str) -> BehavioralInsights {
        self.learning.behavioral_insights(habit_id)
    }

    /// Pick the right notification for the habit's current state and
    /// schedule it:
    /// - completed today and a milestone was just reached: celebration now
    /// - completed today otherwise: nothing, pending nudges are cancelled
    /// - a streak ending yesterday is at risk: recovery nudge
    /// - otherwise: reminder at the learned hour
    pub fn schedule_optimal_notification(&self, habit: &Habit) -> Option<ScheduledNotification> {
        if !self.enabled(&habit.id) {
            return None;
        }
        let records = self.records(&habit.id);
        let today = self.streaks.today();

        if completed_days(&records).contains(&today) {
            let current = self.streaks.current_streak(&records);
            let crossed = self
                .streaks
                .check_for_new_milestone(&records, current.saturating_sub(1))
                .cloned();
            self.cancel_notification_kind(&habit.id, NotificationKind::Reminder);
            self.cancel_notification_kind(&habit.id, NotificationKind::StreakRecovery);
            return match crossed {
                Some(milestone) => self.schedule_milestone_celebration_notification(habit, &milestone),
                None => {
                    tracing::debug!(habit_id = %habit.id, "already completed today, nothing to schedule");
                    None
                }
            };
        }

        if let Some(scheduled) = self.schedule_recovery_notification(habit) {
            return Some(scheduled);
        }

        let preference = self.preference_for_scheduling(&habit.id);
        self.schedule_reminder(habit, &preference)
    }

    /// Nudge toward the next milestone when it is within the lookahead.
    /// The streak counts yesterday's run if today is still open.
    pub fn schedule_streak_milestone_notifications(&self, habit: &Habit) -> Option<ScheduledNotification> {
        if !self.enabled(&habit.id) {
            return None;
        }
        let records = self.records(&habit.id);
        let days = completed_days(&records);
        let today = self.streaks.today();
        let live = match run_ending_at(&days, today) {
            0 => today.pred_opt().map_or(0, |yesterday| run_ending_at(&days, yesterday)),
            n => n,
        };
        if live == 0 {
            return None;
        }

        let next = self.streaks.milestones().upcoming(live);
        let remaining = next.threshold.saturating_sub(live);
        if remaining == 0 || remaining > self.config.milestone_lookahead_days {
            return None;
        }

        let preference = self.preference_for_scheduling(&habit.id);
        let payload = NotificationPayload {
            habit_id: habit.id.clone(),
            kind: NotificationKind::MilestoneApproaching,
            title: format!("{} is close", next.title),
            body: format!(
                "{} more day{} of {} to reach {} days",
                remaining,
                if remaining == 1 { "" } else { "s" },
                habit.name,
                next.threshold
            ),
            frequency_multiplier: preference.frequency_multiplier,
        };
        self.dispatch(preference.preferred_hour, payload)
    }

    /// Recovery nudge at the configured hour when a streak is at risk.
    pub fn schedule_recovery_notification(&self, habit: &Habit) -> Option<ScheduledNotification> {
        if !self.enabled(&habit.id) {
            return None;
        }
        let risk = self.streaks.streak_at_risk(&self.records(&habit.id))?;
        let preference = self.preference_for_scheduling(&habit.id);
        let payload = NotificationPayload {
            habit_id: habit.id.clone(),
            kind: NotificationKind::StreakRecovery,
            title: format!("Keep your {}-day streak", risk.streak_at_stake),
            body: format!("{} is still open today", habit.name),
            frequency_multiplier: preference.frequency_multiplier,
        };
        self.dispatch(self.config.recovery_hour, payload)
    }

    /// Celebrate `milestone` at the current hour.
    pub fn schedule_milestone_celebration_notification(
        &self,
        habit: &Habit,
        milestone: &Milestone,
    ) -> Option<ScheduledNotification> {
        if !self.enabled(&habit.id) {
            return None;
        }
        let preference = self.preference_for_scheduling(&habit.id);
        let hour = u8::try_from(self.clock.now().hour()).unwrap_or(preference.preferred_hour);
        let payload = NotificationPayload {
            habit_id: habit.id.clone(),
            kind: NotificationKind::MilestoneCelebration,
            title: milestone.title.clone(),
            body: format!("{}: {} days of {}", milestone.description, milestone.threshold, habit.name),
            frequency_multiplier: preference.frequency_multiplier,
        };
        self.dispatch(hour, payload)
    }

    fn schedule_reminder(&self, habit: &Habit, preference: &NotificationPreference) -> Option<ScheduledNotification> {
        let payload = NotificationPayload {
            habit_id: habit.id.clone(),
            kind: NotificationKind::Reminder,
            title: habit.name.clone(),
            body: if habit.description.is_empty() {
                format!("Time for {}", habit.name)
            } else {
                habit.description.clone()
            },
            frequency_multiplier: preference.frequency_multiplier,
        };
        self.dispatch(preference.preferred_hour, payload)
    }

    /// Preference to schedule with, saved on first use. A failed save falls
    /// back to the unsaved default.
    fn preference_for_scheduling(&self, habit_id: &str) -> NotificationPreference {
        self.learning.ensure_preference(habit_id).unwrap_or_else(|e| {
            tracing::warn!(habit_id, error = %e, "could not save notification preference");
            self.learning.preference(habit_id)
        })
    }

    fn enabled(&self, habit_id: &str) -> bool {
        if !self.config.enabled {
            tracing::debug!(habit_id, "notifications disabled, not scheduling");
        }
        self.config.enabled
    }

    fn live_schedules(&self, habit_id: &str) -> Vec<ScheduledNotification> {
        read_or_default("schedules", self.store.schedules(habit_id))
    }

    fn live_schedule(&self, habit_id: &str, kind: NotificationKind) -> Option<ScheduledNotification> {
        self.live_schedules(habit_id)
            .into_iter()
            .find(|n| n.kind == kind)
    }

    /// Replace the live schedule of the payload's (habit, kind).
    fn dispatch(&self, hour: u8, payload: NotificationPayload) -> Option<ScheduledNotification> {
        let _slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(previous) = self.live_schedule(&payload.habit_id, payload.kind) {
            self.forget_schedule(&previous);
            if let Err(e) = self.dispatcher.cancel(&previous.id) {
                tracing::warn!(habit_id = %payload.habit_id, error = %e, "failed to cancel replaced notification");
            }
        }

        match self.dispatcher.schedule(hour, &payload) {
            Ok(id) => {
                tracing::info!(
                    habit_id = %payload.habit_id,
                    kind = payload.kind.as_str(),
                    hour,
                    schedule_id = %id,
                    "notification scheduled"
                );
                let notification = ScheduledNotification {
                    id,
                    habit_id: payload.habit_id.clone(),
                    kind: payload.kind,
                    hour,
                    payload,
                };
                if let Err(e) = self.store.save_schedule(&notification) {
                    tracing::warn!(
                        habit_id = %notification.habit_id,
                        schedule_id = %notification.id,
                        error = %e,
                        "failed to persist live schedule"
                    );
                }
                Some(notification)
            }
            Err(e) => {
                tracing::warn!(
                    habit_id = %payload.habit_id,
                    kind = payload.kind.as_str(),
                    error = %e,
                    "notification dispatch failed"
                );
                None
            }
        }
    }

    fn forget_schedule(&self, notification: &ScheduledNotification) {
        if let Err(e) = self.store.delete_schedule(&notification.habit_id, notification.kind) {
            tracing::warn!(
                habit_id = %notification.habit_id,
                kind = notification.kind.as_str(),
                error = %e,
                "failed to remove live schedule"
            );
        }
    }

    fn is_scheduled(&self, habit_id: &str, kind: NotificationKind) -> bool {
        self.live_schedule(habit_id, kind).is_some()
    }

    /// Live schedules of one habit, in kind order.
    pub fn scheduled_for(&self, habit_id: &str) -> Vec<ScheduledNotification> {
        let mut live = self.live_schedules(habit_id);
        live.sort_by_key(|n| NotificationKind::ALL.iter().position(|k| *k == n.kind));
        live
    }

    /// Cancel one kind for a habit. Returns whether anything was live.
    pub fn cancel_notification_kind(&self, habit_id: &str, kind: NotificationKind) -> bool {
        let _slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match self.live_schedule(habit_id, kind) {
            Some(notification) => {
                self.forget_schedule(&notification);
                self.cancel_with_dispatcher(&notification);
                true
            }
            None => false,
        }
    }

    /// Cancel everything scheduled for a habit. Returns how many schedules
    /// were live; zero is not an error.
    pub fn cancel_notifications(&self, habit_id: &str) -> usize {
        let _slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let live = self.live_schedules(habit_id);
        for notification in &live {
            self.forget_schedule(notification);
            self.cancel_with_dispatcher(notification);
        }
        if !live.is_empty() {
            tracing::info!(habit_id, cancelled = live.len(), "notifications cancelled");
        }
        live.len()
    }

    /// Cancel every live schedule.
    pub fn cancel_all_notifications(&self) -> usize {
        let _slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let cancelled = self.store.clear_schedules().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to clear live schedules");
            0
        });
        if let Err(e) = self.dispatcher.cancel_all() {
            tracing::warn!(error = %e, "failed to cancel all notifications");
        }
        tracing::info!(cancelled, "all notifications cancelled");
        cancelled
    }

    fn cancel_with_dispatcher(&self, notification: &ScheduledNotification) {
        if let Err(e) = self.dispatcher.cancel(&notification.id) {
            tracing::warn!(
                habit_id = %notification.habit_id,
                schedule_id = %notification.id,
                error = %e,
                "failed to cancel notification"
            );
        }
    }

    /// Batch pass moving every habit's frequency multiplier toward its
    /// recommended value. Returns `None` when a pass is already running.
    pub fn optimize_notification_frequency(&self) -> Option<OptimizationSummary> {
        let Some(_guard) = RunGuard::try_acquire(&self.optimizing) else {
            tracing::warn!("frequency optimization already running, skipping");
            return None;
        };

        let mut summary = OptimizationSummary::default();
        for habit in read_or_default("habits", self.store.habits()) {
            summary.examined += 1;
            let pattern = self.learning.analyze_response_patterns(&habit.id);
            let current = self.learning.preference(&habit.id).frequency_multiplier;

            if pattern.sample_size == 0 || (pattern.recommended_frequency - current).abs() < f64::EPSILON {
                summary.unchanged += 1;
                continue;
            }
            match self
                .learning
                .set_frequency_multiplier(&habit.id, pattern.recommended_frequency)
            {
                Ok(updated) if updated.frequency_multiplier > current => summary.increased += 1,
                Ok(updated) if updated.frequency_multiplier < current => summary.decreased += 1,
                Ok(_) => summary.unchanged += 1,
                Err(e) => {
                    tracing::warn!(habit_id = %habit.id, error = %e, "failed to save frequency multiplier");
                    summary.unchanged += 1;
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            increased = summary.increased,
            decreased = summary.decreased,
            "frequency optimization finished"
        );
        Some(summary)
    }

    /// Batch pass scheduling recovery and milestone-approaching nudges for
    /// every habit. Returns `None` when a sweep is already running.
    pub fn run_contextual_sweep(&self) -> Option<Vec<ScheduledNotification>> {
        let Some(_guard) = RunGuard::try_acquire(&self.sweeping) else {
            tracing::warn!("contextual sweep already running, skipping");
            return None;
        };

        let mut scheduled = Vec::new();
        for habit in read_or_default("habits", self.store.habits()) {
            scheduled.extend(self.schedule_recovery_notification(&habit));
            scheduled.extend(self.schedule_streak_milestone_notifications(&habit));
        }
        tracing::info!(scheduled = scheduled.len(), "contextual sweep finished");
        Some(scheduled)
    }
}
