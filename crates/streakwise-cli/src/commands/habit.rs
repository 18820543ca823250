//! Habit management commands for CLI.

use chrono::NaiveDate;
use clap::Subcommand;
use serde::Serialize;
use streakwise_core::{
    CompletionRecord, Difficulty, Habit, HabitCategory, HabitFrequency, HabitStore, Milestone,
};

use super::{print_json, CommandResult, Session};

fn parse_category(s: &str) -> Result<HabitCategory, String> {
    HabitCategory::parse(s).ok_or_else(|| format!("unknown category '{s}'"))
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    Difficulty::parse(s).ok_or_else(|| format!("unknown difficulty '{s}' (easy, medium, hard)"))
}

/// `daily`, `weekdays`, `weekly` or `<n>x` for n times per week.
fn parse_frequency(s: &str) -> Result<HabitFrequency, String> {
    match s.to_ascii_lowercase().as_str() {
        "daily" => Ok(HabitFrequency::Daily),
        "weekdays" => Ok(HabitFrequency::Weekdays),
        "weekly" => Ok(HabitFrequency::Weekly),
        other => other
            .strip_suffix('x')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| (1..=7).contains(n))
            .map(|times| HabitFrequency::TimesPerWeek { times })
            .ok_or_else(|| format!("unknown frequency '{s}' (daily, weekdays, weekly, 1x..7x)")),
    }
}

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a new habit
    Add {
        /// Habit name
        name: String,
        /// Habit description
        #[arg(long)]
        description: Option<String>,
        /// Category (health, fitness, productivity, learning, mindfulness, ...)
        #[arg(long, value_parser = parse_category, default_value = "other")]
        category: HabitCategory,
        /// Difficulty: easy, medium or hard
        #[arg(long, value_parser = parse_difficulty, default_value = "medium")]
        difficulty: Difficulty,
        /// Frequency: daily, weekdays, weekly or Nx per week
        #[arg(long, value_parser = parse_frequency, default_value = "daily")]
        frequency: HabitFrequency,
    },
    /// List habits
    List,
    /// Delete a habit with its log and learned notification state
    Remove {
        /// Habit ID
        id: String,
    },
    /// Log a day for a habit
    Complete {
        /// Habit ID
        id: String,
        /// Day to log (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Log the day as missed instead of completed
        #[arg(long)]
        missed: bool,
    },
}

#[derive(Serialize)]
struct CompletionOutput {
    record: CompletionRecord,
    current_streak: u32,
    new_milestone: Option<Milestone>,
}

pub fn run(action: HabitAction) -> CommandResult {
    let session = Session::open()?;

    match action {
        HabitAction::Add {
            name,
            description,
            category,
            difficulty,
            frequency,
        } => {
            let mut habit = Habit::new(name, category)
                .with_difficulty(difficulty)
                .with_frequency(frequency);
            if let Some(description) = description {
                habit = habit.with_description(description);
            }
            session.store.insert_habit(&habit)?;
            tracing::info!(habit_id = %habit.id, "habit created");
            print_json(&habit)?;
        }
        HabitAction::List => {
            print_json(&session.store.habits()?)?;
        }
        HabitAction::Remove { id } => {
            if !session.store.delete_habit(&id)? {
                return Err(format!("habit not found: {id}").into());
            }
            println!("removed {id}");
        }
        HabitAction::Complete { id, date, missed } => {
            let habit = session.habit(&id)?;
            let streaks = session.streaks()?;
            let date = date.unwrap_or_else(|| session.clock.today());

            let previous = streaks.current_streak(&session.store.completions(&id)?);
            let record = if missed {
                CompletionRecord::missed_on(&habit, date)
            } else {
                CompletionRecord::completed_on(&habit, date)
            };
            session.store.insert_completion(&record)?;

            let records = session.store.completions(&id)?;
            let output = CompletionOutput {
                record,
                current_streak: streaks.current_streak(&records),
                new_milestone: streaks.check_for_new_milestone(&records, previous).cloned(),
            };
            print_json(&output)?;
        }
    }
    Ok(())
}
