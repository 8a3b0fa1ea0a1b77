//! Clinical event triggers.
//!
//! A trigger adds a patient to a huddle when one of their coded events falls
//! inside the trigger's lookback window before the huddle date. A patient
//! already added for an event at least as recent is not added again.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::huddle::{Meeting, Reason};
use crate::store::EventRecord;

/// Configured event trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTrigger {
    pub name: String,
    pub lookback_days: u32,
    pub codes: BTreeSet<String>,
    /// Use the event's end timestamp instead of its start
    pub use_end_date: bool,
}

impl EventTrigger {
    /// Detail text shown on a member added by this trigger.
    pub fn detail(&self, event: &EventRecord, effective: DateTime<Utc>) -> String {
        let matched: Vec<&str> = event
            .codes
            .iter()
            .filter(|c| self.codes.contains(*c))
            .map(String::as_str)
            .collect();
        format!(
            "{}: {} on {}",
            self.name,
            matched.join(", "),
            effective.format("%Y-%m-%d")
        )
    }
}

pub(crate) fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Stateless matching rules for event triggers.
pub struct EventMatcher;

impl EventMatcher {
    /// Event date the trigger looks at.
    pub fn effective_date(event: &EventRecord, trigger: &EventTrigger) -> DateTime<Utc> {
        if trigger.use_end_date {
            event.end.unwrap_or(event.start)
        } else {
            event.start
        }
    }

    /// Match `event` against `trigger` in the half-open window `[start, end)`.
    pub fn matches(
        event: &EventRecord,
        trigger: &EventTrigger,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> (DateTime<Utc>, bool) {
        let effective = Self::effective_date(event, trigger);
        let matched = event.has_any_code(&trigger.codes) && start <= effective && effective < end;
        (effective, matched)
    }

    /// Lookback window for the huddle on `meeting_date`.
    ///
    /// Returns `None` when the window would start after `now`.
    pub fn window(
        trigger: &EventTrigger,
        meeting_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = midnight(meeting_date - Duration::days(trigger.lookback_days as i64));
        let end = midnight(meeting_date + Duration::days(1));
        if start > now {
            return None;
        }
        Some((start, end))
    }

    /// Whether `patient_id` was already added for an event at least as recent
    /// as `effective`.
    ///
    /// Looks at huddles dated strictly before `before`, newest first, and
    /// stops at the first one listing the patient for a recent event.
    pub fn already_triggered(
        history: &[Meeting],
        patient_id: &str,
        before: NaiveDate,
        effective: DateTime<Utc>,
    ) -> bool {
        let mut prior: Vec<&Meeting> = history.iter().filter(|m| m.date < before).collect();
        prior.sort_by(|a, b| b.date.cmp(&a.date));

        prior
            .into_iter()
            .find_map(|meeting| {
                meeting
                    .member(patient_id)
                    .filter(|m| m.reason == Reason::RecentEvent)
                    .map(|m| m.trigger_at.unwrap_or_else(|| midnight(meeting.date)))
            })
            .is_some_and(|triggered| triggered >= effective)
    }
}
