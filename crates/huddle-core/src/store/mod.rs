//! Storage contract consumed by the planner.
//!
//! The planner never talks to a database directly. Every store implements
//! [`HuddleStore`]; the crate ships a SQLite-backed store for the CLI and an
//! in-memory store for tests and dry runs.

mod memory;
pub mod migrations;
mod sqlite;

pub use memory::{FailPoint, MemoryStore};
pub use sqlite::SqliteStore;

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::huddle::Meeting;

/// Current risk score of one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub patient_id: String,
    pub score: f64,
    pub assessed_at: DateTime<Utc>,
    /// Last huddle the patient was discussed at, if the store tracks it
    #[serde(default)]
    pub last_meeting: Option<NaiveDate>,
}

/// A coded clinical event (encounter, admission, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub patient_id: String,
    pub codes: Vec<String>,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Persistent store of teams, huddles, scores and clinical events.
///
/// Implementations must be shareable across the worker threads of a batch
/// run. Writes to different huddles may happen concurrently.
pub trait HuddleStore: Send + Sync {
    /// Resolve a team name to its id.
    fn find_team_id(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Huddle of `team_id` on `date`.
    fn find_meeting(&self, team_id: &str, date: NaiveDate) -> Result<Option<Meeting>, StoreError>;

    fn find_meeting_by_id(&self, id: &str) -> Result<Option<Meeting>, StoreError>;

    /// All huddles of `team_id` strictly before `date`, oldest first.
    fn find_meetings_before(&self, team_id: &str, date: NaiveDate) -> Result<Vec<Meeting>, StoreError>;

    /// Insert or replace huddles keyed by team + date.
    ///
    /// Returns one result per input huddle; a failed item does not stop the
    /// remaining ones.
    fn upsert_meetings(&self, meetings: &[Meeting]) -> Vec<Result<(), StoreError>>;

    /// Current scores for `method` within `[min, max]`.
    fn find_scores_in_range(&self, method: &str, min: f64, max: f64) -> Result<Vec<ScoreRecord>, StoreError>;

    /// Events carrying any of `codes` that overlap `[start, end)`.
    fn find_events(
        &self,
        codes: &BTreeSet<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError>;
}

impl EventRecord {
    pub fn has_any_code(&self, codes: &BTreeSet<String>) -> bool {
        self.codes.iter().any(|c| codes.contains(c))
    }

    /// Whether the event overlaps the half-open window `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let last = self.end.unwrap_or(self.start);
        self.start < end && last >= start
    }
}
