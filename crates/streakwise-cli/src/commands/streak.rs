use clap::Subcommand;
use serde::Serialize;
use streakwise_core::streak::{StreakDayData, StreakRisk};
use streakwise_core::{HabitStore, StreakAnalytics};

use super::{print_json, CommandResult, Session};

#[derive(Subcommand)]
pub enum StreakAction {
    /// Streak analytics and recent calendar for a habit
    Show {
        /// Habit ID
        id: String,
        /// Calendar days to include before today
        #[arg(long, default_value = "7")]
        days: u32,
    },
}

#[derive(Serialize)]
struct StreakOutput {
    habit_id: String,
    analytics: StreakAnalytics,
    days_until_next_milestone: u32,
    at_risk: Option<StreakRisk>,
    calendar: Vec<StreakDayData>,
}

pub fn run(action: StreakAction) -> CommandResult {
    let session = Session::open()?;

    match action {
        StreakAction::Show { id, days } => {
            let habit = session.habit(&id)?;
            let streaks = session.streaks()?;
            let records = session.store.completions(&habit.id)?;

            print_json(&StreakOutput {
                habit_id: habit.id,
                analytics: streaks.streak_analytics(&records),
                days_until_next_milestone: streaks.days_until_next_milestone(&records),
                at_risk: streaks.streak_at_risk(&records),
                calendar: streaks.streak_day_data(&records, days),
            })?;
        }
    }
    Ok(())
}
