//! SQLite-based habit storage.
//!
//! Provides persistent storage for:
//! - Habits and their completion log
//! - Learned notification preferences
//! - The append-only interaction log

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, migrations, HabitStore};
use crate::error::{CoreError, StoreError};
use crate::habit::{CompletionRecord, Difficulty, Habit, HabitCategory, HabitFrequency};
use crate::notifications::{
    InteractionKind, InteractionLogEntry, NotificationKind, NotificationPreference, ScheduleId,
    ScheduledNotification,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite database for habit storage.
///
/// The connection sits behind a mutex so the store can be shared between
/// the scheduler, the learning store and analytics readers.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/streakwise.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("streakwise.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn habit_from_row(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let frequency: String = row.get(3)?;
    let category: String = row.get(4)?;
    let difficulty: String = row.get(5)?;
    let created_at: String = row.get(7)?;

    Ok(Habit {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        frequency: serde_json::from_str::<HabitFrequency>(&frequency)
            .map_err(|e| conversion_error(3, e))?,
        category: HabitCategory::parse(&category)
            .ok_or_else(|| conversion_error(4, format!("unknown category '{category}'")))?,
        difficulty: Difficulty::parse(&difficulty)
            .ok_or_else(|| conversion_error(5, format!("unknown difficulty '{difficulty}'")))?,
        xp_weight: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

fn completion_from_row(row: &Row<'_>) -> rusqlite::Result<CompletionRecord> {
    let date: String = row.get(2)?;
    let recorded_at: String = row.get(5)?;
    Ok(CompletionRecord {
        id: row.get(0)?,
        habit_id: row.get(1)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| conversion_error(2, e))?,
        completed: row.get(3)?,
        xp_earned: row.get(4)?,
        recorded_at: parse_timestamp(5, &recorded_at)?,
    })
}

fn interaction_from_row(row: &Row<'_>) -> rusqlite::Result<InteractionLogEntry> {
    let kind: String = row.get(2)?;
    let timestamp: String = row.get(3)?;
    Ok(InteractionLogEntry {
        id: row.get(0)?,
        habit_id: row.get(1)?,
        kind: InteractionKind::parse(&kind)
            .ok_or_else(|| conversion_error(2, format!("unknown interaction kind '{kind}'")))?,
        timestamp: parse_timestamp(3, &timestamp)?,
        scheduled_hour: row.get(4)?,
        response_delay_secs: row.get(5)?,
    })
}

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledNotification> {
    let kind: String = row.get(1)?;
    let payload: String = row.get(4)?;
    Ok(ScheduledNotification {
        habit_id: row.get(0)?,
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| conversion_error(1, format!("unknown notification kind '{kind}'")))?,
        id: ScheduleId(row.get(2)?),
        hour: row.get(3)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(4, e))?,
    })
}

const COMPLETION_COLUMNS: &str = "id, habit_id, date, completed, xp_earned, recorded_at";
const SCHEDULE_COLUMNS: &str = "habit_id, kind, schedule_id, hour, payload";

impl HabitStore for Database {
    fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        let frequency = serde_json::to_string(&habit.frequency).map_err(|e| StoreError::Corrupt {
            column: "frequency".into(),
            message: e.to_string(),
        })?;
        self.conn().execute(
            "INSERT INTO habits (id, name, description, frequency, category, difficulty, xp_weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                frequency = excluded.frequency,
                category = excluded.category,
                difficulty = excluded.difficulty,
                xp_weight = excluded.xp_weight",
            params![
                habit.id,
                habit.name,
                habit.description,
                frequency,
                habit.category.as_str(),
                habit.difficulty.as_str(),
                habit.xp_weight,
                habit.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn habit(&self, id: &str) -> Result<Option<Habit>, StoreError> {
        let conn = self.conn();
        let habit = conn
            .query_row(
                "SELECT id, name, description, frequency, category, difficulty, xp_weight, created_at
                 FROM habits WHERE id = ?1",
                params![id],
                habit_from_row,
            )
            .optional()?;
        Ok(habit)
    }

    fn habits(&self) -> Result<Vec<Habit>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, frequency, category, difficulty, xp_weight, created_at
             FROM habits ORDER BY created_at, id",
        )?;
        let habits = stmt
            .query_map([], habit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    fn delete_habit(&self, id: &str) -> Result<bool, StoreError> {
        // Child rows go with the habit through ON DELETE CASCADE.
        let removed = self
            .conn()
            .execute("DELETE FROM habits WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StoreError> {
        let result = self.conn().execute(
            "INSERT INTO completions (id, habit_id, date, completed, xp_earned, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.habit_id,
                record.date.format(DATE_FORMAT).to_string(),
                record.completed,
                record.xp_earned,
                record.recorded_at.to_rfc3339(),
            ],
        );
        habit_write(result, &record.habit_id)
    }

    fn completions(&self, habit_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM completions WHERE habit_id = ?1 ORDER BY date"
        ))?;
        let records = stmt
            .query_map(params![habit_id], completion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn all_completions(&self) -> Result<Vec<CompletionRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM completions ORDER BY habit_id, date"
        ))?;
        let records = stmt
            .query_map([], completion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn preference(&self, habit_id: &str) -> Result<Option<NotificationPreference>, StoreError> {
        let conn = self.conn();
        let preference = conn
            .query_row(
                "SELECT habit_id, preferred_hour, frequency_multiplier, confidence,
                        failures_since_retime, last_adjusted
                 FROM notification_preferences WHERE habit_id = ?1",
                params![habit_id],
                |row| {
                    let last_adjusted: String = row.get(5)?;
                    Ok(NotificationPreference {
                        habit_id: row.get(0)?,
                        preferred_hour: row.get(1)?,
                        frequency_multiplier: row.get(2)?,
                        confidence: row.get(3)?,
                        failures_since_retime: row.get(4)?,
                        last_adjusted: parse_timestamp(5, &last_adjusted)?,
                    })
                },
            )
            .optional()?;
        Ok(preference)
    }

    fn save_preference(&self, preference: &NotificationPreference) -> Result<(), StoreError> {
        upsert_preference(&self.conn(), preference)
    }

    fn append_interaction(&self, entry: &InteractionLogEntry) -> Result<(), StoreError> {
        insert_interaction(&self.conn(), entry)
    }

    fn record_adaptation(
        &self,
        preference: &NotificationPreference,
        entry: &InteractionLogEntry,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        upsert_preference(&tx, preference)?;
        insert_interaction(&tx, entry)?;
        tx.commit()?;
        Ok(())
    }

    fn interactions(&self, habit_id: &str) -> Result<Vec<InteractionLogEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, habit_id, kind, timestamp, scheduled_hour, response_delay_secs
             FROM interactions WHERE habit_id = ?1 ORDER BY timestamp",
        )?;
        let entries = stmt
            .query_map(params![habit_id], interaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn schedules(&self, habit_id: &str) -> Result<Vec<ScheduledNotification>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE habit_id = ?1"
        ))?;
        let schedules = stmt
            .query_map(params![habit_id], schedule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    fn all_schedules(&self) -> Result<Vec<ScheduledNotification>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY habit_id"
        ))?;
        let schedules = stmt
            .query_map([], schedule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    fn save_schedule(&self, notification: &ScheduledNotification) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&notification.payload).map_err(|e| StoreError::Corrupt {
            column: "payload".into(),
            message: e.to_string(),
        })?;
        let result = self.conn().execute(
            "INSERT INTO schedules (habit_id, kind, schedule_id, hour, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(habit_id, kind) DO UPDATE SET
                schedule_id = excluded.schedule_id,
                hour = excluded.hour,
                payload = excluded.payload",
            params![
                notification.habit_id,
                notification.kind.as_str(),
                notification.id.0,
                notification.hour,
                payload,
            ],
        );
        habit_write(result, &notification.habit_id)
    }

    fn delete_schedule(&self, habit_id: &str, kind: NotificationKind) -> Result<bool, StoreError> {
        let removed = self.conn().execute(
            "DELETE FROM schedules WHERE habit_id = ?1 AND kind = ?2",
            params![habit_id, kind.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn clear_schedules(&self) -> Result<usize, StoreError> {
        Ok(self.conn().execute("DELETE FROM schedules", [])?)
    }
}

/// Map a foreign-key violation on `habit_id` to [`StoreError::UnknownHabit`].
fn habit_write(result: rusqlite::Result<usize>, habit_id: &str) -> Result<(), StoreError> {
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            Err(StoreError::UnknownHabit(habit_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn upsert_preference(conn: &Connection, preference: &NotificationPreference) -> Result<(), StoreError> {
    let result = conn.execute(
        "INSERT INTO notification_preferences
            (habit_id, preferred_hour, frequency_multiplier, confidence, failures_since_retime, last_adjusted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(habit_id) DO UPDATE SET
            preferred_hour = excluded.preferred_hour,
            frequency_multiplier = excluded.frequency_multiplier,
            confidence = excluded.confidence,
            failures_since_retime = excluded.failures_since_retime,
            last_adjusted = excluded.last_adjusted",
        params![
            preference.habit_id,
            preference.preferred_hour,
            preference.frequency_multiplier,
            preference.confidence,
            preference.failures_since_retime,
            preference.last_adjusted.to_rfc3339(),
        ],
    );
    habit_write(result, &preference.habit_id)
}

fn insert_interaction(conn: &Connection, entry: &InteractionLogEntry) -> Result<(), StoreError> {
    let result = conn.execute(
        "INSERT INTO interactions
            (id, habit_id, kind, timestamp, scheduled_hour, response_delay_secs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id,
            entry.habit_id,
            entry.kind.as_str(),
            entry.timestamp.to_rfc3339(),
            entry.scheduled_hour,
            entry.response_delay_secs,
        ],
    );
    habit_write(result, &entry.habit_id)
}
