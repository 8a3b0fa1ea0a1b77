//! Per-patient scheduling state for one planning run.
//!
//! Itineraries are rebuilt from stored huddles and current scores at the
//! start of every run, advanced as the planner fills simulated future
//! huddles, and dropped when the run ends.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::cadence::{Cadence, Targets};
use crate::huddle::Meeting;
use crate::store::ScoreRecord;

/// Scheduling state of one patient.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    pub patient_id: String,
    pub score: Option<f64>,
    /// Index of the matching cadence bucket
    pub bucket: Option<usize>,
    pub last_discussed: Option<NaiveDate>,
    pub targets: Option<Targets>,
}

impl Itinerary {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            score: None,
            bucket: None,
            last_discussed: None,
            targets: None,
        }
    }

    pub fn nearest(&self) -> Option<NaiveDate> {
        self.targets.map(|t| t.nearest)
    }

    pub fn ideal(&self) -> Option<NaiveDate> {
        self.targets.map(|t| t.ideal)
    }

    pub fn furthest(&self) -> Option<NaiveDate> {
        self.targets.map(|t| t.furthest)
    }

    /// Due once the furthest allowed date has arrived.
    pub fn is_due(&self, on: NaiveDate) -> bool {
        self.furthest().is_some_and(|f| f <= on)
    }

    pub fn never_discussed(&self) -> bool {
        self.last_discussed.is_none()
    }
}

/// All itineraries of a run, keyed by patient id.
#[derive(Debug)]
pub struct Itineraries<'a> {
    cadence: &'a Cadence,
    start: NaiveDate,
    entries: HashMap<String, Itinerary>,
}

impl<'a> Itineraries<'a> {
    pub fn new(cadence: &'a Cadence, start: NaiveDate) -> Self {
        Self {
            cadence,
            start,
            entries: HashMap::new(),
        }
    }

    /// Build itineraries from huddles held before `start` and current scores.
    pub fn seed(
        cadence: &'a Cadence,
        start: NaiveDate,
        history: &[Meeting],
        scores: &[ScoreRecord],
    ) -> Self {
        let mut this = Self::new(cadence, start);

        for meeting in history.iter().filter(|m| m.date < start) {
            for member in &meeting.members {
                this.note_discussion(&member.patient_id, meeting.date);
            }
        }

        let mut assessed = HashMap::new();
        for record in scores {
            // Newest assessment wins when a patient has several.
            let newer = assessed
                .get(record.patient_id.as_str())
                .map_or(true, |&at| record.assessed_at >= at);
            if newer {
                assessed.insert(record.patient_id.as_str(), record.assessed_at);
                this.entry(&record.patient_id).score = Some(record.score);
            }
            if let Some(last) = record.last_meeting.filter(|d| *d < start) {
                this.note_discussion(&record.patient_id, last);
            }
        }

        let ids: Vec<String> = this.entries.keys().cloned().collect();
        for id in ids {
            this.refresh(&id);
        }
        this
    }

    fn entry(&mut self, patient_id: &str) -> &mut Itinerary {
        self.entries
            .entry(patient_id.to_string())
            .or_insert_with(|| Itinerary::new(patient_id))
    }

    /// Move last-discussed forward only.
    fn note_discussion(&mut self, patient_id: &str, date: NaiveDate) -> bool {
        let it = self.entry(patient_id);
        match it.last_discussed {
            Some(last) if last >= date => false,
            _ => {
                it.last_discussed = Some(date);
                true
            }
        }
    }

    fn refresh(&mut self, patient_id: &str) {
        let cadence = self.cadence;
        let start = self.start;
        if let Some(it) = self.entries.get_mut(patient_id) {
            it.bucket = it.score.and_then(|s| cadence.bucket_index(s));
            it.targets = it
                .bucket
                .map(|idx| cadence.buckets()[idx].targets(it.last_discussed, start));
        }
    }

    /// Record that `patient_id` is discussed on `date`.
    ///
    /// Returns false when the patient already has a discussion on or after
    /// `date`; the existing state is kept.
    pub fn record_assignment(&mut self, patient_id: &str, date: NaiveDate) -> bool {
        if !self.note_discussion(patient_id, date) {
            return false;
        }
        self.refresh(patient_id);
        true
    }

    pub fn get(&self, patient_id: &str) -> Option<&Itinerary> {
        self.entries.get(patient_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Itinerary> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cadence(&self) -> &Cadence {
        self.cadence
    }

    /// Scores of every patient that falls in a cadence bucket.
    pub fn bucketed_scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries
            .values()
            .filter(|it| it.bucket.is_some())
            .filter_map(|it| it.score)
    }

    /// Number of never-discussed patients per bucket index.
    pub fn never_discussed_by_bucket(&self) -> HashMap<usize, usize> {
        let mut counts = HashMap::new();
        for it in self.entries.values().filter(|it| it.never_discussed()) {
            if let Some(idx) = it.bucket {
                *counts.entry(idx).or_default() += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huddle::{Member, Reason};
    use crate::planner::cadence::CadenceBucket;
    use chrono::{TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn cadence() -> Cadence {
        Cadence::new(
            vec![CadenceBucket {
                min_score: 8.0,
                max_score: 10.0,
                ideal_days: 6,
                min_days: 5,
                max_days: 7,
                ideal_occurrences: None,
            }],
            1,
        )
    }

    fn score(patient: &str, value: f64) -> ScoreRecord {
        ScoreRecord {
            patient_id: patient.into(),
            score: value,
            assessed_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            last_meeting: None,
        }
    }

    fn held(d: u32, patients: &[&str]) -> Meeting {
        let mut m = Meeting::new("team", date(d));
        for p in patients {
            m.add_member(Member::new(*p, Reason::RiskScore, ""));
        }
        m
    }

    #[test]
    fn seed_keeps_most_recent_prior_meeting() {
        let cadence = cadence();
        let history = vec![held(2, &["p1"]), held(9, &["p1"]), held(5, &["p1"])];
        let its = Itineraries::seed(&cadence, date(16), &history, &[score("p1", 9.0)]);

        let p1 = its.get("p1").unwrap();
        assert_eq!(p1.last_discussed, Some(date(9)));
        assert_eq!(p1.nearest(), Some(date(14)));
        assert_eq!(p1.ideal(), Some(date(15)));
        assert_eq!(p1.furthest(), Some(date(16)));
        assert!(p1.is_due(date(16)));
    }

    #[test]
    fn seed_ignores_meetings_inside_planning_window() {
        let cadence = cadence();
        let history = vec![held(9, &["p1"]), held(16, &["p1"])];
        let its = Itineraries::seed(&cadence, date(16), &history, &[score("p1", 9.0)]);
        assert_eq!(its.get("p1").unwrap().last_discussed, Some(date(9)));
    }

    #[test]
    fn score_record_last_meeting_is_merged() {
        let cadence = cadence();
        let mut rec = score("p1", 9.0);
        rec.last_meeting = Some(date(11));
        let its = Itineraries::seed(&cadence, date(16), &[held(9, &["p1"])], &[rec]);
        assert_eq!(its.get("p1").unwrap().last_discussed, Some(date(11)));
    }

    #[test]
    fn unmatched_score_gets_no_targets() {
        let cadence = cadence();
        let its = Itineraries::seed(&cadence, date(16), &[], &[score("p1", 2.0)]);
        let p1 = its.get("p1").unwrap();
        assert_eq!(p1.score, Some(2.0));
        assert!(p1.targets.is_none());
        assert!(!p1.is_due(date(30)));
    }

    #[test]
    fn record_assignment_only_moves_forward() {
        let cadence = cadence();
        let mut its = Itineraries::seed(&cadence, date(2), &[], &[score("p1", 9.0)]);

        assert!(its.record_assignment("p1", date(9)));
        assert!(!its.record_assignment("p1", date(5)));

        let p1 = its.get("p1").unwrap();
        assert_eq!(p1.last_discussed, Some(date(9)));
        assert_eq!(p1.nearest(), Some(date(14)));
    }

    #[test]
    fn assignment_makes_patient_ineligible_for_next_day() {
        let cadence = cadence();
        let mut its = Itineraries::seed(&cadence, date(2), &[], &[score("p1", 9.0)]);
        assert_eq!(its.get("p1").unwrap().nearest(), Some(date(2)));

        its.record_assignment("p1", date(2));
        assert!(its.get("p1").unwrap().nearest().unwrap() > date(3));
    }

    #[test]
    fn newest_assessment_wins() {
        let cadence = cadence();
        let mut newer = score("p1", 2.0);
        newer.assessed_at = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let its = Itineraries::seed(&cadence, date(16), &[], &[newer, score("p1", 9.0)]);
        assert_eq!(its.get("p1").unwrap().score, Some(2.0));
    }

    #[test]
    fn never_discussed_counted_per_bucket() {
        let cadence = cadence();
        let history = vec![held(9, &["p1"])];
        let scores = vec![score("p1", 9.0), score("p2", 9.0), score("p3", 8.5), score("p4", 1.0)];
        let its = Itineraries::seed(&cadence, date(16), &history, &scores);
        assert_eq!(its.never_discussed_by_bucket().get(&0), Some(&2));
        assert_eq!(its.bucketed_scores().count(), 3);
    }
}
