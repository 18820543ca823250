//! Behavioral learning store.
//!
//! Owns the adaptation step for [`NotificationPreference`] and the read
//! side of the interaction log. Writes to one habit's preference are
//! serialized through a per-habit lock; different habits never contend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::preference::{
    Interaction, InteractionKind, InteractionLogEntry, LearningConfig, NotificationPreference,
    TimingAdjustment,
};
use crate::clock::Clock;
use crate::error::{CoreError, ValidationError};
use crate::storage::{read_or_default, HabitStore};
use crate::streak::completed_days;

const HIGH_RESPONSE_RATIO: f64 = 0.7;
const LOW_RESPONSE_RATIO: f64 = 0.3;
const MODERATE_RESPONSE_RATIO: f64 = 0.4;
const ENGAGEMENT_WINDOW_DAYS: i64 = 30;
const INTERACTION_RECENCY_HALF_LIFE_DAYS: f64 = 7.0;

/// Result of one adaptation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationOutcome {
    pub preference: NotificationPreference,
    /// Set when the preferred hour moved
    pub timing_adjustment: Option<TimingAdjustment>,
    /// The interaction id had already been applied; nothing changed
    pub replayed: bool,
}

/// Aggregate of a habit's interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePattern {
    pub habit_id: String,
    pub best_response_hour: u8,
    pub dominant_interaction: Option<InteractionKind>,
    pub recommended_frequency: f64,
    /// Recency-weighted share of completed interactions
    pub completion_ratio: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsivenessPattern {
    HighlyResponsive,
    Moderate,
    Low,
    Unknown,
}

/// Inclusive hour range in which reminders tend to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl EngagementWindow {
    fn around(hour: u8) -> Self {
        Self {
            start_hour: hour.saturating_sub(1),
            end_hour: (hour + 1).min(23),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralInsights {
    pub habit_id: String,
    pub engagement_score: f64,
    pub responsiveness: ResponsivenessPattern,
    pub optimal_window: EngagementWindow,
    pub completion_rate_30d: f64,
    pub confidence: f64,
    pub average_response_delay_secs: Option<f64>,
}

/// Recency-weighted tallies over a slice of log entries.
#[derive(Debug, Default)]
struct WeightedTally {
    by_kind: [f64; 4],
    completed_by_hour: [f64; 24],
}

impl WeightedTally {
    fn collect<'a>(
        entries: impl IntoIterator<Item = &'a InteractionLogEntry>,
        config: &LearningConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let mut tally = Self::default();
        for entry in entries {
            let weight = config.recency_weight(entry.timestamp, now);
            tally.by_kind[entry.kind.index()] += weight;
            if entry.kind == InteractionKind::Completed {
                tally.completed_by_hour[usize::from(entry.scheduled_hour.min(23))] += weight;
            }
        }
        tally
    }

    fn total(&self) -> f64 {
        self.by_kind.iter().sum()
    }

    fn completion_ratio(&self) -> f64 {
        let total = self.total();
        if total > 0.0 {
            self.by_kind[InteractionKind::Completed.index()] / total
        } else {
            0.0
        }
    }

    fn dominant(&self) -> Option<InteractionKind> {
        InteractionKind::ALL
            .into_iter()
            .filter(|kind| self.by_kind[kind.index()] > 0.0)
            .fold(None, |best: Option<InteractionKind>, kind| match best {
                Some(b) if self.by_kind[b.index()] >= self.by_kind[kind.index()] => Some(b),
                _ => Some(kind),
            })
    }

    fn best_hour(&self) -> Option<u8> {
        (0u8..24)
            .filter(|h| self.completed_by_hour[usize::from(*h)] > 0.0)
            .fold(None, |best: Option<u8>, hour| match best {
                Some(b) if self.completed_by_hour[usize::from(b)] >= self.completed_by_hour[usize::from(hour)] => Some(b),
                _ => Some(hour),
            })
    }
}

pub struct BehavioralLearningStore {
    store: Arc<dyn HabitStore>,
    clock: Arc<dyn Clock>,
    config: LearningConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BehavioralLearningStore {
    pub fn new(store: Arc<dyn HabitStore>, clock: Arc<dyn Clock>, config: LearningConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    fn habit_lock(&self, habit_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(habit_id.to_string()).or_default().clone()
    }

    /// Stored preference, or the default one if none exists yet.
    pub fn preference(&self, habit_id: &str) -> NotificationPreference {
        read_or_default("preference", self.store.preference(habit_id))
            .unwrap_or_else(|| NotificationPreference::new(habit_id, &self.config, self.clock.now()))
    }

    /// Stored preference, creating and saving the default on first use.
    pub fn ensure_preference(&self, habit_id: &str) -> Result<NotificationPreference, CoreError> {
        let lock = self.habit_lock(habit_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = read_or_default("preference", self.store.preference(habit_id)) {
            return Ok(existing);
        }
        let created = NotificationPreference::new(habit_id, &self.config, self.clock.now());
        self.store.save_preference(&created)?;
        tracing::debug!(habit_id, hour = created.preferred_hour, "notification preference created");
        Ok(created)
    }

    pub fn interactions(&self, habit_id: &str) -> Vec<InteractionLogEntry> {
        read_or_default("interactions", self.store.interactions(habit_id))
    }

    /// Apply one interaction to the habit's preference and log it.
    ///
    /// An interaction whose id is already in the habit's log changes
    /// nothing and reports `replayed`.
    pub fn adapt(&self, habit_id: &str, interaction: &Interaction) -> Result<AdaptationOutcome, CoreError> {
        if interaction.scheduled_hour > 23 {
            return Err(ValidationError::InvalidHour(u32::from(interaction.scheduled_hour)).into());
        }

        let lock = self.habit_lock(habit_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let now = self.clock.now();
        let mut log = self.interactions(habit_id);
        let mut preference = read_or_default("preference", self.store.preference(habit_id))
            .unwrap_or_else(|| NotificationPreference::new(habit_id, &self.config, now));

        if log.iter().any(|entry| entry.id == interaction.id) {
            tracing::debug!(habit_id, interaction_id = %interaction.id, "interaction already applied");
            return Ok(AdaptationOutcome {
                preference,
                timing_adjustment: None,
                replayed: true,
            });
        }

        let entry = InteractionLogEntry::from_interaction(habit_id, interaction, now);
        log.push(entry.clone());

        let before = preference.confidence;
        preference.apply_interaction(interaction.kind, &self.config);

        let timing_adjustment = if preference.needs_retiming(interaction.kind, &self.config) {
            let wanted = self.preferred_direction(&log, preference.preferred_hour, now);
            let from = preference.preferred_hour;
            let taken = preference.retime(wanted, &self.config);
            tracing::info!(habit_id, from, to = preference.preferred_hour, direction = ?taken, "reminder retimed");
            Some(taken)
        } else {
            None
        };

        preference.last_adjusted = now;
        preference.clamp(&self.config);
        // The log entry doubles as the replay marker, so it only lands
        // together with the preference it produced.
        self.store.record_adaptation(&preference, &entry)?;

        tracing::info!(
            habit_id,
            kind = interaction.kind.as_str(),
            confidence_before = before,
            confidence = preference.confidence,
            "preference adapted"
        );

        Ok(AdaptationOutcome {
            preference,
            timing_adjustment,
            replayed: false,
        })
    }

    /// Which side of `hour` historically completed better. Ties and
    /// missing data favour later.
    fn preferred_direction(&self, log: &[InteractionLogEntry], hour: u8, now: DateTime<Utc>) -> TimingAdjustment {
        let earlier = WeightedTally::collect(log.iter().filter(|e| e.scheduled_hour < hour), &self.config, now);
        let later = WeightedTally::collect(log.iter().filter(|e| e.scheduled_hour > hour), &self.config, now);
        if earlier.completion_ratio() > later.completion_ratio() {
            TimingAdjustment::Earlier
        } else {
            TimingAdjustment::Later
        }
    }

    /// Set the frequency multiplier under the habit lock, clamped to the
    /// configured bounds.
    pub fn set_frequency_multiplier(
        &self,
        habit_id: &str,
        multiplier: f64,
    ) -> Result<NotificationPreference, CoreError> {
        let lock = self.habit_lock(habit_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut preference = read_or_default("preference", self.store.preference(habit_id))
            .unwrap_or_else(|| NotificationPreference::new(habit_id, &self.config, self.clock.now()));
        preference.frequency_multiplier = multiplier;
        preference.last_adjusted = self.clock.now();
        preference.clamp(&self.config);
        self.store.save_preference(&preference)?;
        Ok(preference)
    }

    pub fn analyze_response_patterns(&self, habit_id: &str) -> ResponsePattern {
        let preference = self.preference(habit_id);
        let log = self.interactions(habit_id);
        let tally = WeightedTally::collect(&log, &self.config, self.clock.now());
        let ratio = tally.completion_ratio();

        let recommended = if log.is_empty() {
            preference.frequency_multiplier
        } else if ratio >= HIGH_RESPONSE_RATIO {
            preference.frequency_multiplier * (1.0 + self.config.frequency_step)
        } else if ratio <= LOW_RESPONSE_RATIO {
            preference.frequency_multiplier * (1.0 - self.config.frequency_step)
        } else {
            preference.frequency_multiplier
        };

        ResponsePattern {
            habit_id: habit_id.to_string(),
            best_response_hour: tally.best_hour().unwrap_or(preference.preferred_hour),
            dominant_interaction: tally.dominant(),
            recommended_frequency: self.config.clamp_multiplier(recommended),
            completion_ratio: ratio,
            sample_size: log.len(),
        }
    }

    pub fn behavioral_insights(&self, habit_id: &str) -> BehavioralInsights {
        let now = self.clock.now();
        let today = self.clock.today();
        let preference = self.preference(habit_id);
        let pattern = self.analyze_response_patterns(habit_id);
        let log = self.interactions(habit_id);

        let records = read_or_default("completions", self.store.completions(habit_id));
        let since = today - Duration::days(ENGAGEMENT_WINDOW_DAYS - 1);
        let completed_30d = completed_days(&records).range(since..=today).count();
        let completion_rate_30d = completed_30d as f64 / ENGAGEMENT_WINDOW_DAYS as f64;

        let recency = log
            .iter()
            .map(|e| e.timestamp)
            .max()
            .map(|last| {
                let days = (now - last).num_seconds().max(0) as f64 / 86_400.0;
                0.5f64.powf(days / INTERACTION_RECENCY_HALF_LIFE_DAYS)
            })
            .unwrap_or(0.0);

        let engagement_score =
            (0.5 * completion_rate_30d + 0.25 * recency + 0.25 * preference.confidence).clamp(0.0, 1.0);

        let responsiveness = if log.is_empty() {
            ResponsivenessPattern::Unknown
        } else if pattern.completion_ratio >= HIGH_RESPONSE_RATIO {
            ResponsivenessPattern::HighlyResponsive
        } else if pattern.completion_ratio >= MODERATE_RESPONSE_RATIO {
            ResponsivenessPattern::Moderate
        } else {
            ResponsivenessPattern::Low
        };

        let delays: Vec<f64> = log
            .iter()
            .filter_map(|e| e.response_delay_secs.map(f64::from))
            .collect();
        let average_response_delay_secs =
            (!delays.is_empty()).then(|| delays.iter().sum::<f64>() / delays.len() as f64);

        BehavioralInsights {
            habit_id: habit_id.to_string(),
            engagement_score,
            responsiveness,
            optimal_window: EngagementWindow::around(pattern.best_response_hour),
            completion_rate_30d,
            confidence: preference.confidence,
            average_response_delay_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::habit::{CompletionRecord, Habit, HabitCategory};
    use crate::storage::MemoryStore;
    use chrono::NaiveDate;

    fn setup() -> (Arc<MemoryStore>, Arc<FixedClock>, BehavioralLearningStore) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_habit(&Habit::new("Read", HabitCategory::Learning).with_id("read"))
            .unwrap();
        let clock = Arc::new(FixedClock::at(NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(), 12));
        let learning = BehavioralLearningStore::new(store.clone(), clock.clone(), LearningConfig::default());
        (store, clock, learning)
    }

    #[test]
    fn missing_preference_uses_defaults() {
        let (_, _, learning) = setup();
        let pref = learning.preference("read");
        assert_eq!(pref.preferred_hour, 9);
        assert_eq!(pref.confidence, 0.5);
        assert_eq!(pref.frequency_multiplier, 1.0);
    }

    #[test]
    fn ensure_preference_persists_once() {
        let (store, clock, learning) = setup();
        let first = learning.ensure_preference("read").unwrap();
        clock.advance(Duration::hours(1));
        let second = learning.ensure_preference("read").unwrap();
        assert_eq!(first, second);
        assert!(store.preference("read").unwrap().is_some());
    }

    #[test]
    fn completion_raises_confidence_and_logs() {
        let (store, clock, learning) = setup();
        clock.advance(Duration::minutes(5));
        let outcome = learning
            .adapt("read", &Interaction::new(InteractionKind::Completed, 9))
            .unwrap();
        assert!((outcome.preference.confidence - 0.6).abs() < 1e-9);
        assert_eq!(outcome.preference.last_adjusted, clock.now());
        assert!(!outcome.replayed);
        assert_eq!(store.interactions("read").unwrap().len(), 1);
    }

    #[test]
    fn snooze_lowers_confidence_without_retiming() {
        let (_, _, learning) = setup();
        for _ in 0..20 {
            let outcome = learning
                .adapt("read", &Interaction::new(InteractionKind::Snoozed, 9))
                .unwrap();
            assert_eq!(outcome.timing_adjustment, None);
        }
        let pref = learning.preference("read");
        assert_eq!(pref.preferred_hour, 9);
        assert!(pref.confidence < 0.1);
    }

    #[test]
    fn replayed_interaction_is_noop() {
        let (store, _, learning) = setup();
        let interaction = Interaction::new(InteractionKind::Dismissed, 9).with_id("evt-1");
        let first = learning.adapt("read", &interaction).unwrap();
        let second = learning.adapt("read", &interaction).unwrap();
        assert!(second.replayed);
        assert_eq!(first.preference, second.preference);
        assert_eq!(store.interactions("read").unwrap().len(), 1);
    }

    #[test]
    fn dismissals_retime_toward_later_without_history() {
        let (_, _, learning) = setup();
        let mut adjustments = Vec::new();
        for _ in 0..5 {
            let outcome = learning
                .adapt("read", &Interaction::new(InteractionKind::Dismissed, 9))
                .unwrap();
            adjustments.extend(outcome.timing_adjustment);
        }
        // 0.5 -> 0.4 -> 0.32 -> 0.256 crosses the 0.3 threshold on the third dismissal
        assert_eq!(adjustments, vec![TimingAdjustment::Later]);
        assert_eq!(learning.preference("read").preferred_hour, 10);
    }

    #[test]
    fn retime_follows_earlier_completions() {
        let (_, _, learning) = setup();
        for _ in 0..3 {
            learning
                .adapt("read", &Interaction::new(InteractionKind::Completed, 7))
                .unwrap();
        }
        let mut moved = None;
        for _ in 0..10 {
            let outcome = learning
                .adapt("read", &Interaction::new(InteractionKind::Ignored, 9))
                .unwrap();
            if outcome.timing_adjustment.is_some() {
                moved = outcome.timing_adjustment;
                break;
            }
        }
        assert_eq!(moved, Some(TimingAdjustment::Earlier));
        assert_eq!(learning.preference("read").preferred_hour, 8);
    }

    #[test]
    fn rejects_invalid_hour_and_unknown_habit() {
        let (_, _, learning) = setup();
        let mut bad = Interaction::new(InteractionKind::Completed, 9);
        bad.scheduled_hour = 24;
        assert!(matches!(
            learning.adapt("read", &bad),
            Err(CoreError::Validation(ValidationError::InvalidHour(24)))
        ));
        assert!(learning
            .adapt("ghost", &Interaction::new(InteractionKind::Completed, 9))
            .is_err());
    }

    #[test]
    fn response_patterns_weight_recent_behavior() {
        let (_, clock, learning) = setup();
        for _ in 0..4 {
            learning
                .adapt("read", &Interaction::new(InteractionKind::Dismissed, 8))
                .unwrap();
        }
        clock.advance(Duration::days(60));
        for _ in 0..2 {
            learning
                .adapt("read", &Interaction::new(InteractionKind::Completed, 18))
                .unwrap();
        }
        let pattern = learning.analyze_response_patterns("read");
        assert_eq!(pattern.sample_size, 6);
        assert_eq!(pattern.best_response_hour, 18);
        assert_eq!(pattern.dominant_interaction, Some(InteractionKind::Completed));
        assert!(pattern.completion_ratio > 0.7);
        assert!((pattern.recommended_frequency - 1.2).abs() < 1e-9);
    }

    #[test]
    fn empty_log_patterns() {
        let (_, _, learning) = setup();
        let pattern = learning.analyze_response_patterns("read");
        assert_eq!(pattern.best_response_hour, 9);
        assert_eq!(pattern.dominant_interaction, None);
        assert_eq!(pattern.recommended_frequency, 1.0);
        assert_eq!(pattern.sample_size, 0);
    }

    #[test]
    fn insights_combine_completion_recency_and_confidence() {
        let (store, clock, learning) = setup();
        let habit = store.habit("read").unwrap().unwrap();
        let today = clock.today();
        for d in 0..15 {
            store
                .insert_completion(&CompletionRecord::completed_on(&habit, today - Duration::days(d)))
                .unwrap();
        }
        learning
            .adapt("read", &Interaction::new(InteractionKind::Completed, 9).with_response_delay(120))
            .unwrap();

        let insights = learning.behavioral_insights("read");
        assert!((insights.completion_rate_30d - 0.5).abs() < 1e-9);
        // 0.5 * 0.5 + 0.25 * 1.0 + 0.25 * 0.6
        assert!((insights.engagement_score - 0.65).abs() < 1e-9);
        assert_eq!(insights.responsiveness, ResponsivenessPattern::HighlyResponsive);
        assert_eq!(insights.optimal_window, EngagementWindow { start_hour: 8, end_hour: 10 });
        assert_eq!(insights.average_response_delay_secs, Some(120.0));
    }

    #[test]
    fn insights_without_history() {
        let (_, _, learning) = setup();
        let insights = learning.behavioral_insights("read");
        assert_eq!(insights.responsiveness, ResponsivenessPattern::Unknown);
        assert!((insights.engagement_score - 0.125).abs() < 1e-9);
        assert_eq!(insights.average_response_delay_secs, None);
    }

    #[test]
    fn window_clamps_at_day_edges() {
        assert_eq!(EngagementWindow::around(0), EngagementWindow { start_hour: 0, end_hour: 1 });
        assert_eq!(EngagementWindow::around(23), EngagementWindow { start_hour: 22, end_hour: 23 });
    }

    #[test]
    fn frequency_multiplier_is_clamped() {
        let (_, _, learning) = setup();
        assert_eq!(learning.set_frequency_multiplier("read", 10.0).unwrap().frequency_multiplier, 3.0);
        assert_eq!(learning.set_frequency_multiplier("read", 0.0).unwrap().frequency_multiplier, 0.1);
    }
}
