//! Adaptive notification commands.
//!
//! Schedule/cancel requests are handed to a channel dispatcher; the command
//! prints whatever landed on the channel so a shell can deliver it.

use clap::Subcommand;
use serde::Serialize;
use streakwise_core::notifications::{drain_pending, DispatchRequest, ScheduledNotification};
use streakwise_core::{Interaction, InteractionKind};

use super::{print_json, CommandResult, Session};

fn parse_kind(s: &str) -> Result<InteractionKind, String> {
    InteractionKind::parse(s)
        .ok_or_else(|| format!("unknown interaction '{s}' (completed, dismissed, ignored, snoozed)"))
}

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Report how the user reacted to a reminder
    Interact {
        /// Habit ID
        habit_id: String,
        /// completed, dismissed, ignored or snoozed
        #[arg(value_parser = parse_kind)]
        kind: InteractionKind,
        /// Hour the reminder was scheduled for (default: learned hour)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=23))]
        hour: Option<u8>,
        /// Event id; repeating an id is a no-op
        #[arg(long)]
        id: Option<String>,
        /// Seconds between reminder and reaction
        #[arg(long)]
        delay: Option<u32>,
    },
    /// Schedule the best notification for a habit right now
    Schedule {
        /// Habit ID
        habit_id: String,
    },
    /// Schedule recovery and milestone nudges for every habit
    Sweep,
    /// Tune every habit's reminder frequency from its response pattern
    Optimize,
    /// Aggregated response pattern for a habit
    Patterns {
        /// Habit ID
        habit_id: String,
    },
    /// Engagement insights for a habit
    Insights {
        /// Habit ID
        habit_id: String,
    },
    /// Cancel notifications for a habit, or all of them
    Cancel {
        /// Habit ID
        habit_id: Option<String>,
        /// Cancel everything
        #[arg(long, conflicts_with = "habit_id")]
        all: bool,
    },
}

#[derive(Serialize)]
struct DispatchOutput {
    scheduled: Vec<ScheduledNotification>,
    requests: Vec<DispatchRequest>,
}

pub fn run(action: NotifyAction) -> CommandResult {
    let session = Session::open()?;
    let (scheduler, mut rx) = session.scheduler()?;

    match action {
        NotifyAction::Interact {
            habit_id,
            kind,
            hour,
            id,
            delay,
        } => {
            session.habit(&habit_id)?;
            let hour = hour.unwrap_or_else(|| scheduler.learning().preference(&habit_id).preferred_hour);
            let mut interaction = Interaction::new(kind, hour);
            if let Some(id) = id {
                interaction = interaction.with_id(id);
            }
            if let Some(delay) = delay {
                interaction = interaction.with_response_delay(delay);
            }
            print_json(&scheduler.adapt_to_user_behavior(&habit_id, &interaction)?)?;
        }
        NotifyAction::Schedule { habit_id } => {
            let habit = session.habit(&habit_id)?;
            let scheduled = scheduler.schedule_optimal_notification(&habit).into_iter().collect();
            print_json(&DispatchOutput {
                scheduled,
                requests: drain_pending(&mut rx),
            })?;
        }
        NotifyAction::Sweep => {
            let scheduled = scheduler.run_contextual_sweep().unwrap_or_default();
            print_json(&DispatchOutput {
                scheduled,
                requests: drain_pending(&mut rx),
            })?;
        }
        NotifyAction::Optimize => {
            let summary = scheduler.optimize_notification_frequency().unwrap_or_default();
            print_json(&summary)?;
        }
        NotifyAction::Patterns { habit_id } => {
            session.habit(&habit_id)?;
            print_json(&scheduler.analyze_user_response_patterns(&habit_id))?;
        }
        NotifyAction::Insights { habit_id } => {
            session.habit(&habit_id)?;
            print_json(&scheduler.get_behavioral_insights(&habit_id))?;
        }
        NotifyAction::Cancel { habit_id, all } => {
            let cancelled = match habit_id {
                Some(habit_id) if !all => scheduler.cancel_notifications(&habit_id),
                _ => scheduler.cancel_all_notifications(),
            };
            print_json(&serde_json::json!({
                "cancelled": cancelled,
                "requests": drain_pending(&mut rx),
            }))?;
        }
    }
    Ok(())
}
