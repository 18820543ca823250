//! Persistence contract and its implementations.
//!
//! The engine only talks to [`HabitStore`]. [`Database`] keeps everything
//! in SQLite; [`MemoryStore`] keeps it in process.

mod config;
pub mod database;
mod memory;
pub mod migrations;

pub use config::{Config, LoggingConfig, StreakConfig};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::{ConfigError, StoreError};
use crate::habit::{CompletionRecord, Habit};
use crate::notifications::{
    InteractionLogEntry, NotificationKind, NotificationPreference, ScheduledNotification,
};

/// Storage the engine consumes. Implementations must be safe to share
/// across threads; the engine serializes per-habit preference writes itself.
pub trait HabitStore: Send + Sync {
    fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError>;

    fn habit(&self, id: &str) -> Result<Option<Habit>, StoreError>;

    fn habits(&self) -> Result<Vec<Habit>, StoreError>;

    /// Delete a habit together with its completion records, notification
    /// preference, interaction log and live schedules. Returns whether the
    /// habit existed.
    fn delete_habit(&self, id: &str) -> Result<bool, StoreError>;

    fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StoreError>;

    fn completions(&self, habit_id: &str) -> Result<Vec<CompletionRecord>, StoreError>;

    fn all_completions(&self) -> Result<Vec<CompletionRecord>, StoreError>;

    /// Completion records matching `predicate`.
    fn completions_where(
        &self,
        predicate: &dyn Fn(&CompletionRecord) -> bool,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        Ok(self
            .all_completions()?
            .into_iter()
            .filter(|r| predicate(r))
            .collect())
    }

    fn preference(&self, habit_id: &str) -> Result<Option<NotificationPreference>, StoreError>;

    fn save_preference(&self, preference: &NotificationPreference) -> Result<(), StoreError>;

    fn append_interaction(&self, entry: &InteractionLogEntry) -> Result<(), StoreError>;

    fn interactions(&self, habit_id: &str) -> Result<Vec<InteractionLogEntry>, StoreError>;

    /// Save the preference an interaction produced together with its log
    /// entry. Implementations that can should make this atomic; the
    /// fallback writes the preference first so a failed save leaves no
    /// log entry behind.
    fn record_adaptation(
        &self,
        preference: &NotificationPreference,
        entry: &InteractionLogEntry,
    ) -> Result<(), StoreError> {
        self.save_preference(preference)?;
        self.append_interaction(entry)
    }

    /// Live schedules of one habit.
    fn schedules(&self, habit_id: &str) -> Result<Vec<ScheduledNotification>, StoreError>;

    fn all_schedules(&self) -> Result<Vec<ScheduledNotification>, StoreError>;

    /// Insert or replace the live schedule of the notification's
    /// (habit, kind).
    fn save_schedule(&self, notification: &ScheduledNotification) -> Result<(), StoreError>;

    /// Forget one live schedule. Returns whether it existed.
    fn delete_schedule(&self, habit_id: &str, kind: NotificationKind) -> Result<bool, StoreError>;

    /// Forget every live schedule. Returns how many there were.
    fn clear_schedules(&self) -> Result<usize, StoreError>;
}

/// Run a read against the store, logging and swallowing failures.
pub(crate) fn read_or_default<T: Default>(
    what: &str,
    result: Result<T, StoreError>,
) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, read = what, "store read failed, treating as empty");
        T::default()
    })
}

/// Returns the data directory.
///
/// `STREAKWISE_DATA_DIR` wins if set. Otherwise `~/.config/streakwise`, or
/// `~/.config/streakwise-dev` when `STREAKWISE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STREAKWISE_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("STREAKWISE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("streakwise-dev")
            } else {
                base_dir.join("streakwise")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
