//! Database schema migrations for streakwise.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(tx: &Connection, version: i32) -> SqliteResult<()> {
    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: habits and their completion log.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS habits (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            frequency   TEXT NOT NULL,
            category    TEXT NOT NULL,
            difficulty  TEXT NOT NULL,
            xp_weight   INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS completions (
            id          TEXT PRIMARY KEY,
            habit_id    TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            date        TEXT NOT NULL,
            completed   INTEGER NOT NULL,
            xp_earned   INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_completions_habit_date ON completions(habit_id, date);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: adaptive notification state.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS notification_preferences (
            habit_id             TEXT PRIMARY KEY REFERENCES habits(id) ON DELETE CASCADE,
            preferred_hour       INTEGER NOT NULL,
            frequency_multiplier REAL NOT NULL,
            confidence           REAL NOT NULL,
            last_adjusted        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS interactions (
            id                  TEXT NOT NULL,
            habit_id            TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            kind                TEXT NOT NULL,
            timestamp           TEXT NOT NULL,
            scheduled_hour      INTEGER NOT NULL,
            response_delay_secs INTEGER,
            PRIMARY KEY (habit_id, id)
        );

        CREATE INDEX IF NOT EXISTS idx_interactions_habit ON interactions(habit_id, timestamp);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: live schedules and the retime failure count.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE notification_preferences
            ADD COLUMN failures_since_retime INTEGER NOT NULL DEFAULT 0;

        CREATE TABLE IF NOT EXISTS schedules (
            habit_id    TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            kind        TEXT NOT NULL,
            schedule_id TEXT NOT NULL,
            hour        INTEGER NOT NULL,
            payload     TEXT NOT NULL,
            PRIMARY KEY (habit_id, kind)
        );",
    )?;
    set_schema_version(&tx, 3)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn v2_database_upgrades_in_place() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO habits (id, name, frequency, category, difficulty, xp_weight, created_at)
                VALUES ('h1', 'Read', '{\"kind\":\"daily\"}', 'learning', 'medium', 20, '2024-01-01T00:00:00Z');
             INSERT INTO notification_preferences
                VALUES ('h1', 9, 1.0, 0.4, '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 3);
        let failures: i64 = conn
            .query_row(
                "SELECT failures_since_retime FROM notification_preferences WHERE habit_id = 'h1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(failures, 0);
    }
}
