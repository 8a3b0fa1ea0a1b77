//! In-memory [`HuddleStore`] used by tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};

use super::{EventRecord, HuddleStore, ScoreRecord};
use crate::error::StoreError;
use crate::huddle::Meeting;

/// Lookup that a [`MemoryStore`] can be told to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Team,
    History,
    Scores,
    Events,
    Meeting(NaiveDate),
    Upsert(NaiveDate),
}

#[derive(Default)]
struct Inner {
    teams: HashMap<String, String>,
    meetings: BTreeMap<(String, NaiveDate), Meeting>,
    scores: Vec<(String, ScoreRecord)>,
    events: Vec<EventRecord>,
    failures: HashSet<FailPoint>,
}

/// Mutex-guarded maps implementing the store contract.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store poisoned: {e}")))
    }

    fn check(&self, inner: &Inner, point: FailPoint) -> Result<(), StoreError> {
        if inner.failures.contains(&point) {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    /// Register a team and return its id. Registering twice returns the
    /// existing id.
    pub fn create_team(&self, name: &str) -> Result<String, StoreError> {
        let mut inner = self.lock()?;
        let id = inner
            .teams
            .entry(name.to_string())
            .or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        Ok(id)
    }

    pub fn insert_meeting(&self, meeting: Meeting) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .meetings
            .insert((meeting.team_id.clone(), meeting.date), meeting);
        Ok(())
    }

    pub fn put_score(&self, method: &str, record: ScoreRecord) -> Result<(), StoreError> {
        self.lock()?.scores.push((method.to_string(), record));
        Ok(())
    }

    pub fn put_event(&self, event: EventRecord) -> Result<(), StoreError> {
        self.lock()?.events.push(event);
        Ok(())
    }

    /// All huddles of a team, oldest first.
    pub fn meetings(&self, team_id: &str) -> Result<Vec<Meeting>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .meetings
            .values()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect())
    }

    pub fn fail_at(&self, point: FailPoint) -> Result<(), StoreError> {
        self.lock()?.failures.insert(point);
        Ok(())
    }
}

impl HuddleStore for MemoryStore {
    fn find_team_id(&self, name: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock()?;
        self.check(&inner, FailPoint::Team)?;
        Ok(inner.teams.get(name).cloned())
    }

    fn find_meeting(&self, team_id: &str, date: NaiveDate) -> Result<Option<Meeting>, StoreError> {
        let inner = self.lock()?;
        self.check(&inner, FailPoint::Meeting(date))?;
        Ok(inner.meetings.get(&(team_id.to_string(), date)).cloned())
    }

    fn find_meeting_by_id(&self, id: &str) -> Result<Option<Meeting>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.meetings.values().find(|m| m.id == id).cloned())
    }

    fn find_meetings_before(&self, team_id: &str, date: NaiveDate) -> Result<Vec<Meeting>, StoreError> {
        let inner = self.lock()?;
        self.check(&inner, FailPoint::History)?;
        Ok(inner
            .meetings
            .values()
            .filter(|m| m.team_id == team_id && m.date < date)
            .cloned()
            .collect())
    }

    fn upsert_meetings(&self, meetings: &[Meeting]) -> Vec<Result<(), StoreError>> {
        let mut inner = match self.lock() {
            Ok(inner) => inner,
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
            .map(|m| {
                self.check(&inner, FailPoint::Upsert(m.date))?;
                inner.meetings.insert((m.team_id.clone(), m.date), m.clone());
                Ok(())
            })
            .collect()
    }

    fn find_scores_in_range(&self, method: &str, min: f64, max: f64) -> Result<Vec<ScoreRecord>, StoreError> {
        let inner = self.lock()?;
        self.check(&inner, FailPoint::Scores)?;
        Ok(inner
            .scores
            .iter()
            .filter(|(m, r)| m == method && r.score >= min && r.score <= max)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn find_events(
        &self,
        codes: &BTreeSet<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let inner = self.lock()?;
        self.check(&inner, FailPoint::Events)?;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.has_any_code(codes) && e.overlaps(start, end))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huddle::{Member, Reason};
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn upsert_replaces_by_team_and_date() {
        let store = MemoryStore::new();
        let team = store.create_team("North").unwrap();

        let mut first = Meeting::new(&team, date(2));
        first.add_member(Member::new("p1", Reason::RiskScore, ""));
        let second = Meeting::new(&team, date(2));

        assert!(store.upsert_meetings(&[first]).iter().all(|r| r.is_ok()));
        assert!(store.upsert_meetings(&[second.clone()]).iter().all(|r| r.is_ok()));

        let stored = store.find_meeting(&team, date(2)).unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(store.meetings(&team).unwrap().len(), 1);
    }

    #[test]
    fn failed_upsert_does_not_stop_batch() {
        let store = MemoryStore::new();
        store.fail_at(FailPoint::Upsert(date(3))).unwrap();
        let results = store.upsert_meetings(&[
            Meeting::new("t", date(2)),
            Meeting::new("t", date(3)),
            Meeting::new("t", date(4)),
        ]);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert_eq!(store.meetings("t").unwrap().len(), 2);
    }

    #[test]
    fn meetings_before_is_strict_and_sorted() {
        let store = MemoryStore::new();
        for d in [9, 2, 5] {
            store.insert_meeting(Meeting::new("t", date(d))).unwrap();
        }
        let before = store.find_meetings_before("t", date(9)).unwrap();
        let dates: Vec<_> = before.iter().map(|m| m.date).collect();
        assert_eq!(dates, vec![date(2), date(5)]);
    }

    #[test]
    fn events_filtered_by_code_and_window() {
        let store = MemoryStore::new();
        let at = |d| Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap();
        store
            .put_event(EventRecord {
                patient_id: "p1".into(),
                codes: vec!["HOSP".into()],
                start: at(1),
                end: Some(at(4)),
            })
            .unwrap();
        store
            .put_event(EventRecord {
                patient_id: "p2".into(),
                codes: vec!["ED".into()],
                start: at(3),
                end: None,
            })
            .unwrap();

        let codes: BTreeSet<String> = ["HOSP".to_string()].into();
        let found = store.find_events(&codes, at(3), at(10)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].patient_id, "p1");
    }
}
