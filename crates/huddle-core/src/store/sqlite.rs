//! SQLite-backed [`HuddleStore`].
//!
//! Provides persistent storage for:
//! - Teams and their huddles (members kept in insertion order)
//! - Current risk scores per assessment method
//! - Coded clinical events

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::migrations;
use super::{EventRecord, HuddleStore, ScoreRecord};
use crate::error::StoreError;
use crate::huddle::{Meeting, Member, Reason};
use crate::storage::data_dir;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| StoreError::Invariant(format!("bad date '{value}': {e}")))
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Invariant(format!("bad timestamp '{value}': {e}")))
}

fn parse_reason(value: &str) -> Result<Reason, StoreError> {
    Reason::parse(value).ok_or_else(|| StoreError::Invariant(format!("unknown reason '{value}'")))
}

/// SQLite database for huddle storage.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at `~/.config/huddle/huddles.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(dir.join("huddles.db"))
    }

    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (tests, dry runs).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("connection poisoned: {e}")))
    }

    /// Register a team, returning the existing id if the name is taken.
    pub fn create_team(&self, name: &str) -> Result<String, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO teams (id, name) VALUES (?1, ?2)",
            params![uuid::Uuid::new_v4().to_string(), name],
        )?;
        let id = conn.query_row("SELECT id FROM teams WHERE name = ?1", params![name], |row| {
            row.get(0)
        })?;
        Ok(id)
    }

    /// Insert or replace the current score of a patient for `method`.
    pub fn put_score(&self, method: &str, record: &ScoreRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO scores (patient_id, method, score, assessed_at, last_meeting)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.patient_id,
                method,
                record.score,
                format_timestamp(record.assessed_at),
                record.last_meeting.map(format_date),
            ],
        )?;
        Ok(())
    }

    pub fn put_event(&self, event: &EventRecord) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events (patient_id, codes, start_at, end_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.patient_id,
                serde_json::to_string(&event.codes)?,
                format_timestamp(event.start),
                event.end.map(format_timestamp),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn load_members(conn: &Connection, meeting_id: &str) -> Result<Vec<Member>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT patient_id, reason, detail, reviewed, reviewed_at, trigger_at
             FROM members WHERE meeting_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![meeting_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut members = Vec::new();
        for row in rows {
            let (patient_id, reason, detail, reviewed, reviewed_at, trigger_at) = row?;
            members.push(Member {
                patient_id,
                reason: parse_reason(&reason)?,
                detail,
                reviewed,
                reviewed_at: reviewed_at.as_deref().map(parse_timestamp).transpose()?,
                trigger_at: trigger_at.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(members)
    }

    fn load_meetings(
        conn: &Connection,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Meeting>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let heads = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        heads
            .into_iter()
            .map(|(id, team_id, date)| {
                let members = Self::load_members(conn, &id)?;
                Ok(Meeting {
                    date: parse_date(&date)?,
                    id,
                    team_id,
                    members,
                })
            })
            .collect()
    }

    fn write_meeting(conn: &mut Connection, meeting: &Meeting) -> Result<(), StoreError> {
        let tx = conn.transaction()?;
        let date = format_date(meeting.date);

        tx.execute(
            "DELETE FROM members WHERE meeting_id = ?3
                OR meeting_id IN (SELECT id FROM meetings WHERE team_id = ?1 AND date = ?2)",
            params![meeting.team_id, date, meeting.id],
        )?;
        tx.execute(
            "DELETE FROM meetings WHERE id = ?3 OR (team_id = ?1 AND date = ?2)",
            params![meeting.team_id, date, meeting.id],
        )?;
        tx.execute(
            "INSERT INTO meetings (id, team_id, date) VALUES (?1, ?2, ?3)",
            params![meeting.id, meeting.team_id, date],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO members
                    (meeting_id, position, patient_id, reason, detail, reviewed, reviewed_at, trigger_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (position, member) in meeting.members.iter().enumerate() {
                stmt.execute(params![
                    meeting.id,
                    position as i64,
                    member.patient_id,
                    member.reason.as_str(),
                    member.detail,
                    member.reviewed,
                    member.reviewed_at.map(format_timestamp),
                    member.trigger_at.map(format_timestamp),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl HuddleStore for SqliteStore {
    fn find_team_id(&self, name: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let id = conn
            .query_row("SELECT id FROM teams WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    fn find_meeting(&self, team_id: &str, date: NaiveDate) -> Result<Option<Meeting>, StoreError> {
        let conn = self.lock()?;
        let date = format_date(date);
        let found = Self::load_meetings(
            &conn,
            "SELECT id, team_id, date FROM meetings WHERE team_id = ?1 AND date = ?2",
            params![team_id, date],
        )?;
        Ok(found.into_iter().next())
    }

    fn find_meeting_by_id(&self, id: &str) -> Result<Option<Meeting>, StoreError> {
        let conn = self.lock()?;
        let found = Self::load_meetings(
            &conn,
            "SELECT id, team_id, date FROM meetings WHERE id = ?1",
            params![id],
        )?;
        Ok(found.into_iter().next())
    }

    fn find_meetings_before(&self, team_id: &str, date: NaiveDate) -> Result<Vec<Meeting>, StoreError> {
        let conn = self.lock()?;
        let date = format_date(date);
        Self::load_meetings(
            &conn,
            "SELECT id, team_id, date FROM meetings
             WHERE team_id = ?1 AND date < ?2 ORDER BY date",
            params![team_id, date],
        )
    }

    fn upsert_meetings(&self, meetings: &[Meeting]) -> Vec<Result<(), StoreError>> {
        let mut conn = match self.lock() {
            Ok(conn) => conn,
            Err(e) => {
                let msg = e.to_string();
                return meetings
                    .iter()
                    .map(|_| Err(StoreError::Unavailable(msg.clone())))
                    .collect();
            }
        };

        meetings
            .iter()
            .map(|m| Self::write_meeting(&mut conn, m))
            .collect()
    }

    fn find_scores_in_range(&self, method: &str, min: f64, max: f64) -> Result<Vec<ScoreRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT patient_id, score, assessed_at, last_meeting FROM scores
             WHERE method = ?1 AND score >= ?2 AND score <= ?3
             ORDER BY patient_id",
        )?;
        let rows = stmt.query_map(params![method, min, max], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (patient_id, score, assessed_at, last_meeting) = row?;
            records.push(ScoreRecord {
                patient_id,
                score,
                assessed_at: parse_timestamp(&assessed_at)?,
                last_meeting: last_meeting.as_deref().map(parse_date).transpose()?,
            });
        }
        Ok(records)
    }

    fn find_events(
        &self,
        codes: &BTreeSet<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT patient_id, codes, start_at, end_at FROM events
             WHERE start_at < ?2 AND COALESCE(end_at, start_at) >= ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![format_timestamp(start), format_timestamp(end)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )?;

        let mut events = Vec::new();
        for row in rows {
            let (patient_id, event_codes, start_at, end_at) = row?;
            let event = EventRecord {
                patient_id,
                codes: serde_json::from_str(&event_codes)?,
                start: parse_timestamp(&start_at)?,
                end: end_at.as_deref().map(parse_timestamp).transpose()?,
            };
            if event.has_any_code(codes) {
                events.push(event);
            }
        }
        Ok(events)
    }
}
