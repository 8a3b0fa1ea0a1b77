//! Database schema migrations for the huddle store.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
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
            tracing::warn!("failed to read schema_version: {}", e);
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: teams, huddles, members and scores.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS teams (
            id    TEXT PRIMARY KEY,
            name  TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS meetings (
            id       TEXT PRIMARY KEY,
            team_id  TEXT NOT NULL REFERENCES teams(id),
            date     TEXT NOT NULL,
            UNIQUE (team_id, date)
        );

        CREATE TABLE IF NOT EXISTS members (
            meeting_id   TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            position     INTEGER NOT NULL,
            patient_id   TEXT NOT NULL,
            reason       TEXT NOT NULL,
            detail       TEXT NOT NULL DEFAULT '',
            reviewed     INTEGER NOT NULL DEFAULT 0,
            reviewed_at  TEXT,
            PRIMARY KEY (meeting_id, patient_id)
        );

        CREATE TABLE IF NOT EXISTS scores (
            patient_id    TEXT NOT NULL,
            method        TEXT NOT NULL,
            score         REAL NOT NULL,
            assessed_at   TEXT NOT NULL,
            last_meeting  TEXT,
            PRIMARY KEY (patient_id, method)
        );

        CREATE INDEX IF NOT EXISTS idx_meetings_team_date ON meetings(team_id, date);
        CREATE INDEX IF NOT EXISTS idx_scores_method_score ON scores(method, score);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: clinical events and event provenance on members.
///
/// Adds:
/// - events table (codes stored as a JSON array)
/// - members.trigger_at: effective date of the event behind a RECENT_EVENT entry
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id  TEXT NOT NULL,
            codes       TEXT NOT NULL DEFAULT '[]',
            start_at    TEXT NOT NULL,
            end_at      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_at);

        ALTER TABLE members ADD COLUMN trigger_at TEXT;",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
