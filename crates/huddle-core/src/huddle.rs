//! Huddle (meeting) and member model.
//!
//! A huddle is one occurrence of a care team's recurring discussion,
//! identified by team + date. Its members are the patients to discuss, each
//! with the reason they were placed on the list.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Why a patient is on a huddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// Selected by the risk-score cadence
    RiskScore,
    /// Triggered by a recent clinical event
    RecentEvent,
    /// Unreviewed on an earlier huddle and rolled forward
    Rollover,
    /// Added by a care-team member
    ManualAddition,
    /// Present on the previous huddle but not discussed. The planner never
    /// assigns it; huddles written by other tools may carry it and replans
    /// keep such members in place.
    CarriedOver,
}

impl Reason {
    /// Whether a later add for the same patient may replace this entry.
    pub fn is_overwritable(self) -> bool {
        matches!(self, Reason::Rollover)
    }

    /// Whether the planner keeps this entry when it rebuilds a huddle.
    pub fn is_preserved(self) -> bool {
        matches!(
            self,
            Reason::ManualAddition | Reason::Rollover | Reason::CarriedOver
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reason::RiskScore => "RISK_SCORE",
            Reason::RecentEvent => "RECENT_EVENT",
            Reason::Rollover => "ROLLOVER",
            Reason::ManualAddition => "MANUAL_ADDITION",
            Reason::CarriedOver => "CARRIED_OVER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RISK_SCORE" => Some(Reason::RiskScore),
            "RECENT_EVENT" => Some(Reason::RecentEvent),
            "ROLLOVER" => Some(Reason::Rollover),
            "MANUAL_ADDITION" => Some(Reason::ManualAddition),
            "CARRIED_OVER" => Some(Reason::CarriedOver),
            _ => None,
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patient's entry on a huddle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub patient_id: String,
    pub reason: Reason,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Effective date of the clinical event behind a `RecentEvent` entry
    #[serde(default)]
    pub trigger_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new(patient_id: impl Into<String>, reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            reason,
            detail: detail.into(),
            reviewed: false,
            reviewed_at: None,
            trigger_at: None,
        }
    }

    pub fn with_trigger_at(mut self, at: DateTime<Utc>) -> Self {
        self.trigger_at = Some(at);
        self
    }

    pub fn mark_reviewed(&mut self, at: DateTime<Utc>) {
        self.reviewed = true;
        self.reviewed_at = Some(at);
    }
}

/// Outcome of [`Meeting::add_member`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Replaced,
    AlreadyPresent,
}

/// One occurrence of a team's huddle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub team_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Meeting {
    /// Create an empty huddle with a fresh id.
    pub fn new(team_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            team_id: team_id.into(),
            date,
            members: Vec::new(),
        }
    }

    pub fn member(&self, patient_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.patient_id == patient_id)
    }

    pub fn contains(&self, patient_id: &str) -> bool {
        self.member(patient_id).is_some()
    }

    /// Add a member, keeping at most one entry per patient.
    ///
    /// An existing `Rollover` entry is replaced in place; any other existing
    /// entry wins and the call is a no-op.
    pub fn add_member(&mut self, member: Member) -> AddOutcome {
        match self
            .members
            .iter_mut()
            .find(|m| m.patient_id == member.patient_id)
        {
            Some(existing) if existing.reason.is_overwritable() => {
                *existing = member;
                AddOutcome::Replaced
            }
            Some(_) => AddOutcome::AlreadyPresent,
            None => {
                self.members.push(member);
                AddOutcome::Added
            }
        }
    }

    /// Remove a patient. Returns the removed entry.
    pub fn remove_member(&mut self, patient_id: &str) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.patient_id == patient_id)?;
        Some(self.members.remove(idx))
    }

    /// Whether review of this huddle has started.
    pub fn has_reviewed_member(&self) -> bool {
        self.members.iter().any(|m| m.reviewed)
    }

    pub fn count_reason(&self, reason: Reason) -> usize {
        self.members.iter().filter(|m| m.reason == reason).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting() -> Meeting {
        Meeting::new("team-1", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
    }

    #[test]
    fn add_member_is_noop_for_non_rollover_entry() {
        let mut m = meeting();
        m.add_member(Member::new("p1", Reason::ManualAddition, "asked by GP"));
        let outcome = m.add_member(Member::new("p1", Reason::RiskScore, "score 9"));

        assert_eq!(outcome, AddOutcome::AlreadyPresent);
        assert_eq!(m.members.len(), 1);
        assert_eq!(m.members[0].reason, Reason::ManualAddition);
    }

    #[test]
    fn add_member_replaces_rollover_entry_in_place() {
        let mut m = meeting();
        m.add_member(Member::new("p0", Reason::RiskScore, ""));
        m.add_member(Member::new("p1", Reason::Rollover, "Rolled Over from 2026-02-23 ()"));
        m.add_member(Member::new("p2", Reason::RiskScore, ""));

        let outcome = m.add_member(Member::new("p1", Reason::RecentEvent, "HOSP"));

        assert_eq!(outcome, AddOutcome::Replaced);
        assert_eq!(m.members.len(), 3);
        assert_eq!(m.members[1].patient_id, "p1");
        assert_eq!(m.members[1].reason, Reason::RecentEvent);
    }

    #[test]
    fn reason_round_trips_through_its_code() {
        for reason in [
            Reason::RiskScore,
            Reason::RecentEvent,
            Reason::Rollover,
            Reason::ManualAddition,
            Reason::CarriedOver,
        ] {
            assert_eq!(Reason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(Reason::parse("risk_score"), None);
    }

    #[test]
    fn only_rollover_is_overwritable() {
        assert!(Reason::Rollover.is_overwritable());
        assert!(!Reason::ManualAddition.is_overwritable());
        assert!(!Reason::CarriedOver.is_overwritable());
        assert!(!Reason::RiskScore.is_overwritable());
    }

    #[test]
    fn reviewed_member_marks_meeting_in_progress() {
        let mut m = meeting();
        m.add_member(Member::new("p1", Reason::RiskScore, ""));
        assert!(!m.has_reviewed_member());
        m.members[0].mark_reviewed(Utc::now());
        assert!(m.has_reviewed_member());
        assert!(m.members[0].reviewed_at.is_some());
    }

    #[test]
    fn remove_member_returns_entry() {
        let mut m = meeting();
        m.add_member(Member::new("p1", Reason::RiskScore, ""));
        assert!(m.remove_member("p2").is_none());
        assert_eq!(m.remove_member("p1").unwrap().patient_id, "p1");
        assert!(m.members.is_empty());
    }
}
