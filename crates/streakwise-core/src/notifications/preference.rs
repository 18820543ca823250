//! Per-habit notification preference and the interaction log.
//!
//! Confidence moves by an exponential moving average: a completion pulls it
//! a fixed fraction of the way toward 1.0, a dismissal/ignore/snooze pushes
//! it a fixed fraction of the way toward 0.0. Each step depends only on the
//! current value, so confidence cannot leave [0, 1]. Moving the preferred
//! hour never touches confidence; only completions raise it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tuning constants for the adaptive learning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Hour used before anything has been learned (0-23)
    pub default_hour: u8,
    /// Lower bound for the frequency multiplier
    pub min_frequency_multiplier: f64,
    /// Upper bound for the frequency multiplier
    pub max_frequency_multiplier: f64,
    /// Confidence assigned to a fresh preference
    pub initial_confidence: f64,
    /// Fraction of the remaining distance to 1.0 gained per completion
    pub completed_rate: f64,
    /// Fraction of confidence lost per dismissal
    pub dismissed_rate: f64,
    /// Fraction of confidence lost per ignored reminder
    pub ignored_rate: f64,
    /// Fraction of confidence lost per snooze
    pub snoozed_rate: f64,
    /// Below this confidence a dismissal or ignore moves the preferred hour
    pub retime_threshold: f64,
    /// Dismissals/ignores needed at the current hour before it can move again
    pub retime_min_failures: u32,
    /// Age (days) at which an interaction counts half as much
    pub recency_half_life_days: f64,
    /// Relative multiplier change per optimization pass
    pub frequency_step: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            default_hour: 9,
            min_frequency_multiplier: 0.1,
            max_frequency_multiplier: 3.0,
            initial_confidence: 0.5,
            completed_rate: 0.2,
            dismissed_rate: 0.2,
            ignored_rate: 0.15,
            snoozed_rate: 0.1,
            retime_threshold: 0.3,
            retime_min_failures: 3,
            recency_half_life_days: 14.0,
            frequency_step: 0.2,
        }
    }
}

impl LearningConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_hour > 23 {
            return Err(ValidationError::InvalidHour(u32::from(self.default_hour)));
        }
        if !(self.min_frequency_multiplier > 0.0
            && self.min_frequency_multiplier <= self.max_frequency_multiplier)
        {
            return Err(ValidationError::InvalidValue {
                field: "frequency multiplier bounds".into(),
                message: format!(
                    "need 0 < min <= max, got [{}, {}]",
                    self.min_frequency_multiplier, self.max_frequency_multiplier
                ),
            });
        }
        let unit_fields = [
            ("initial_confidence", self.initial_confidence),
            ("completed_rate", self.completed_rate),
            ("dismissed_rate", self.dismissed_rate),
            ("ignored_rate", self.ignored_rate),
            ("snoozed_rate", self.snoozed_rate),
            ("retime_threshold", self.retime_threshold),
            ("frequency_step", self.frequency_step),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    message: format!("{value} outside [0, 1]"),
                });
            }
        }
        if self.recency_half_life_days <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "recency_half_life_days".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn clamp_multiplier(&self, multiplier: f64) -> f64 {
        multiplier.clamp(self.min_frequency_multiplier, self.max_frequency_multiplier)
    }

    /// Weight of an interaction that happened at `at`, seen from `now`.
    pub fn recency_weight(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
        0.5f64.powf(age_days / self.recency_half_life_days)
    }
}

/// How the user reacted to a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Completed,
    Dismissed,
    Ignored,
    Snoozed,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 4] = [
        InteractionKind::Completed,
        InteractionKind::Dismissed,
        InteractionKind::Ignored,
        InteractionKind::Snoozed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Completed => "completed",
            InteractionKind::Dismissed => "dismissed",
            InteractionKind::Ignored => "ignored",
            InteractionKind::Snoozed => "snoozed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "completed" => Some(InteractionKind::Completed),
            "dismissed" => Some(InteractionKind::Dismissed),
            "ignored" => Some(InteractionKind::Ignored),
            "snoozed" => Some(InteractionKind::Snoozed),
            _ => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            InteractionKind::Completed => 0,
            InteractionKind::Dismissed => 1,
            InteractionKind::Ignored => 2,
            InteractionKind::Snoozed => 3,
        }
    }
}

/// Direction in which the preferred hour was nudged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingAdjustment {
    Earlier,
    Later,
}

/// An interaction event as reported by the application shell.
///
/// `id` identifies the event; replaying the same id is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub kind: InteractionKind,
    pub scheduled_hour: u8,
    pub response_delay_secs: Option<u32>,
}

impl Interaction {
    pub fn new(kind: InteractionKind, scheduled_hour: u8) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            scheduled_hour: scheduled_hour.min(23),
            response_delay_secs: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_response_delay(mut self, secs: u32) -> Self {
        self.response_delay_secs = Some(secs);
        self
    }
}

/// Append-only record of an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionLogEntry {
    pub id: String,
    pub habit_id: String,
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
    pub scheduled_hour: u8,
    pub response_delay_secs: Option<u32>,
}

impl InteractionLogEntry {
    pub fn from_interaction(habit_id: &str, interaction: &Interaction, at: DateTime<Utc>) -> Self {
        Self {
            id: interaction.id.clone(),
            habit_id: habit_id.to_string(),
            kind: interaction.kind,
            timestamp: at,
            scheduled_hour: interaction.scheduled_hour,
            response_delay_secs: interaction.response_delay_secs,
        }
    }
}

/// Learned reminder timing for one habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub habit_id: String,
    pub preferred_hour: u8,
    pub frequency_multiplier: f64,
    pub confidence: f64,
    /// Dismissals and ignores since the last completion or retime
    #[serde(default)]
    pub failures_since_retime: u32,
    pub last_adjusted: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn new(habit_id: impl Into<String>, config: &LearningConfig, now: DateTime<Utc>) -> Self {
        Self {
            habit_id: habit_id.into(),
            preferred_hour: config.default_hour.min(23),
            frequency_multiplier: config.clamp_multiplier(1.0),
            confidence: config.initial_confidence.clamp(0.0, 1.0),
            failures_since_retime: 0,
            last_adjusted: now,
        }
    }

    /// One bounded confidence step for `kind`.
    pub fn apply_interaction(&mut self, kind: InteractionKind, config: &LearningConfig) {
        let c = self.confidence;
        self.confidence = match kind {
            InteractionKind::Completed => c + config.completed_rate * (1.0 - c),
            InteractionKind::Dismissed => c - config.dismissed_rate * c,
            InteractionKind::Ignored => c - config.ignored_rate * c,
            InteractionKind::Snoozed => c - config.snoozed_rate * c,
        };
        self.failures_since_retime = match kind {
            InteractionKind::Completed => 0,
            InteractionKind::Dismissed | InteractionKind::Ignored => self.failures_since_retime.saturating_add(1),
            InteractionKind::Snoozed => self.failures_since_retime,
        };
        self.clamp(config);
    }

    /// Whether a failed reminder should move the preferred hour: confidence
    /// is low and the current hour has failed often enough since it was
    /// last chosen.
    pub fn needs_retiming(&self, kind: InteractionKind, config: &LearningConfig) -> bool {
        matches!(kind, InteractionKind::Dismissed | InteractionKind::Ignored)
            && self.confidence < config.retime_threshold
            && self.failures_since_retime >= config.retime_min_failures
    }

    /// Move the preferred hour one step and restart the failure count.
    /// Confidence is left as is. Returns the direction actually taken, which
    /// flips at the ends of the day.
    pub fn retime(&mut self, direction: TimingAdjustment, config: &LearningConfig) -> TimingAdjustment {
        let taken = match (direction, self.preferred_hour) {
            (TimingAdjustment::Later, 23) => TimingAdjustment::Earlier,
            (TimingAdjustment::Earlier, 0) => TimingAdjustment::Later,
            (d, _) => d,
        };
        self.preferred_hour = match taken {
            TimingAdjustment::Earlier => self.preferred_hour - 1,
            TimingAdjustment::Later => self.preferred_hour + 1,
        };
        self.failures_since_retime = 0;
        self.clamp(config);
        taken
    }

    pub fn clamp(&mut self, config: &LearningConfig) {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            config.initial_confidence.clamp(0.0, 1.0)
        };
        self.frequency_multiplier = if self.frequency_multiplier.is_finite() {
            config.clamp_multiplier(self.frequency_multiplier)
        } else {
            config.clamp_multiplier(1.0)
        };
        self.preferred_hour = self.preferred_hour.min(23);
    }
}
