//! Habit and completion-record types.
//!
//! A [`Habit`] owns its [`CompletionRecord`]s through `habit_id`; stores
//! delete the records (and the habit's notification state) together with
//! the habit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How often the user intends to perform a habit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekdays,
    Weekly,
    TimesPerWeek { times: u8 },
}

/// Grouping used by category insights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitCategory {
    Health,
    Fitness,
    Productivity,
    Learning,
    Mindfulness,
    Social,
    Finance,
    Creativity,
    #[default]
    Other,
}

impl HabitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HabitCategory::Health => "health",
            HabitCategory::Fitness => "fitness",
            HabitCategory::Productivity => "productivity",
            HabitCategory::Learning => "learning",
            HabitCategory::Mindfulness => "mindfulness",
            HabitCategory::Social => "social",
            HabitCategory::Finance => "finance",
            HabitCategory::Creativity => "creativity",
            HabitCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let category = match s.to_ascii_lowercase().as_str() {
            "health" => HabitCategory::Health,
            "fitness" => HabitCategory::Fitness,
            "productivity" => HabitCategory::Productivity,
            "learning" => HabitCategory::Learning,
            "mindfulness" => HabitCategory::Mindfulness,
            "social" => HabitCategory::Social,
            "finance" => HabitCategory::Finance,
            "creativity" => HabitCategory::Creativity,
            "other" => HabitCategory::Other,
            _ => return None,
        };
        Some(category)
    }
}

/// Perceived effort of a habit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// XP awarded per completion when the habit doesn't override it.
    pub fn default_xp(&self) -> u32 {
        match self {
            Difficulty::Easy => 10,
            Difficulty::Medium => 20,
            Difficulty::Hard => 35,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// A tracked habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default)]
    pub category: HabitCategory,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub xp_weight: u32,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    /// Create a daily habit with a fresh id.
    pub fn new(name: impl Into<String>, category: HabitCategory) -> Self {
        let difficulty = Difficulty::default();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            frequency: HabitFrequency::default(),
            category,
            difficulty,
            xp_weight: difficulty.default_xp(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_frequency(mut self, frequency: HabitFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Sets the difficulty and resets the XP weight to its default.
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self.xp_weight = difficulty.default_xp();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// One logged day of a habit.
///
/// Records are append-only. Several records may exist for the same day;
/// streak code deduplicates them by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub id: String,
    pub habit_id: String,
    pub date: NaiveDate,
    pub completed: bool,
    pub xp_earned: u32,
    pub recorded_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// A completed record for `habit` on `date`, earning the habit's XP weight.
    pub fn completed_on(habit: &Habit, date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            habit_id: habit.id.clone(),
            date,
            completed: true,
            xp_earned: habit.xp_weight,
            recorded_at: Utc::now(),
        }
    }

    /// A record marking `date` as explicitly not done.
    pub fn missed_on(habit: &Habit, date: NaiveDate) -> Self {
        Self {
            completed: false,
            xp_earned: 0,
            ..Self::completed_on(habit, date)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_sets_xp_weight() {
        let habit = Habit::new("Run", HabitCategory::Fitness).with_difficulty(Difficulty::Hard);
        assert_eq!(habit.xp_weight, 35);
    }

    #[test]
    fn completion_record_inherits_habit_xp() {
        let habit = Habit::new("Read", HabitCategory::Learning).with_id("h1");
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let record = CompletionRecord::completed_on(&habit, date);
        assert_eq!(record.habit_id, "h1");
        assert_eq!(record.xp_earned, 20);
        assert!(record.completed);

        let missed = CompletionRecord::missed_on(&habit, date);
        assert!(!missed.completed);
        assert_eq!(missed.xp_earned, 0);
    }

    #[test]
    fn frequency_serializes_with_tag() {
        let json = serde_json::to_string(&HabitFrequency::TimesPerWeek { times: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"times_per_week","times":3}"#);
        let decoded: HabitFrequency = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, HabitFrequency::TimesPerWeek { times: 3 });
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(HabitCategory::parse("Mindfulness"), Some(HabitCategory::Mindfulness));
        assert_eq!(HabitCategory::parse("nope"), None);
        assert_eq!(HabitCategory::Finance.as_str(), "finance");
    }

    #[test]
    fn enum_defaults() {
        assert_eq!(HabitFrequency::default(), HabitFrequency::Daily);
        assert_eq!(HabitCategory::default(), HabitCategory::Other);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
    }
}
