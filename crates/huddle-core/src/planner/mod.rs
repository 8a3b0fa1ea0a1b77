//! Huddle planning engine.
//!
//! Provides:
//! - Cadence buckets mapping risk scores to discussion spacing
//! - Per-run patient itineraries
//! - Priority ordering of candidates
//! - Event triggers and rollover of unreviewed members
//! - The planner that fills and persists upcoming huddles
//! - A batch runner for many teams at once

pub mod batch;
pub mod cadence;
pub mod itinerary;
pub mod priority;
pub mod rollover;
pub mod trigger;

pub use batch::{BatchReport, BatchRunner, TeamLease, TeamLeases};
pub use cadence::{Cadence, CadenceBucket, Targets};
pub use itinerary::{Itineraries, Itinerary};
pub use priority::PriorityComparator;
pub use rollover::{RolloverResolver, RolloverResult};
pub use trigger::{EventMatcher, EventTrigger};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{ConfigError, PlanError, Result};
use crate::huddle::{AddOutcome, Meeting, Member, Reason};
use crate::storage::PlanningConfig;
use crate::store::HuddleStore;

/// Event trigger that could not be evaluated during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTrigger {
    pub trigger: String,
    pub date: NaiveDate,
    pub reason: String,
}

/// Outcome of one planning run for one team.
#[derive(Debug, Default)]
pub struct PlanReport {
    pub team: String,
    /// Huddles in date order, frozen ones included
    pub meetings: Vec<Meeting>,
    /// Per-huddle persistence failures
    pub errors: Vec<PlanError>,
    pub skipped_triggers: Vec<SkippedTrigger>,
    pub target_size: usize,
}

impl PlanReport {
    fn new(team: &str) -> Self {
        Self {
            team: team.to_string(),
            ..Self::default()
        }
    }

    /// No persistence failure and no skipped trigger.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.skipped_triggers.is_empty()
    }

    pub fn meeting_on(&self, date: NaiveDate) -> Option<&Meeting> {
        self.meetings.iter().find(|m| m.date == date)
    }
}

/// Per-meeting cap on never-discussed patients from each bucket.
fn never_discussed_quotas(
    config: &PlanningConfig,
    itineraries: &Itineraries<'_>,
    first: NaiveDate,
) -> HashMap<usize, usize> {
    itineraries
        .never_discussed_by_bucket()
        .into_iter()
        .map(|(idx, count)| {
            let max_days = config.cadence.buckets()[idx].max_days as i64;
            let days = config.meeting_days_between(first, first + Duration::days(max_days));
            let quota = if days == 0 { count } else { count.div_ceil(days) };
            (idx, quota.max(1))
        })
        .collect()
}

/// Planner over a shared store.
pub struct HuddlePlanner {
    store: Arc<dyn HuddleStore>,
    persist: bool,
}

impl HuddlePlanner {
    pub fn new(store: Arc<dyn HuddleStore>) -> Self {
        Self {
            store,
            persist: true,
        }
    }

    /// Planner that computes huddles without writing them back.
    pub fn dry_run(store: Arc<dyn HuddleStore>) -> Self {
        Self {
            store,
            persist: false,
        }
    }

    pub fn store(&self) -> &Arc<dyn HuddleStore> {
        &self.store
    }

    pub fn plan_huddles(&self, config: &PlanningConfig) -> Result<PlanReport> {
        self.plan_huddles_at(config, Utc::now())
    }

    /// Plan the next `lookahead` huddles of a team as of `now`.
    ///
    /// Team resolution and seeding failures abort the run before anything is
    /// written. Persistence failures and unreadable event triggers are
    /// collected in the report and the run carries on. A huddle that cannot
    /// be loaded ends the run; huddles planned before it stay in the report.
    pub fn plan_huddles_at(&self, config: &PlanningConfig, now: DateTime<Utc>) -> Result<PlanReport> {
        if config.weekdays.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.weekdays", config.team),
                message: "at least one meeting weekday is required".into(),
            }
            .into());
        }
        let today = now.date_naive();
        let team_id = self
            .store
            .find_team_id(&config.team)?
            .ok_or_else(|| ConfigError::UnknownTeam(config.team.clone()))?;

        let mut context = self.store.find_meetings_before(&team_id, today)?;
        let scores = match config.cadence.score_range() {
            Some((min, max)) => self.store.find_scores_in_range(&config.risk_method, min, max)?,
            None => Vec::new(),
        };

        let mut itineraries = Itineraries::seed(&config.cadence, today, &context, &scores);
        let target = config.cadence.target_size(itineraries.bucketed_scores());
        let first = context.iter().map(|m| m.date).min().unwrap_or(today);
        let quotas = never_discussed_quotas(config, &itineraries, first);

        tracing::info!(
            team = %config.team,
            patients = itineraries.len(),
            history = context.len(),
            target_size = target,
            "planning huddles"
        );

        let mut report = PlanReport::new(&config.team);
        report.target_size = target;

        let mut first_rebuild = true;
        let mut date = today;
        let mut planned = 0;
        while planned < config.lookahead {
            if !config.is_meeting_day(date) {
                date += Duration::days(1);
                continue;
            }
            planned += 1;

            let mut meeting = match self.store.find_meeting(&team_id, date) {
                Ok(found) => found.unwrap_or_else(|| Meeting::new(team_id.clone(), date)),
                Err(err) => {
                    tracing::warn!(team = %config.team, %date, error = %err, "failed to load huddle, stopping run");
                    report.errors.push(PlanError::Lookup(err));
                    break;
                }
            };

            if date == today && meeting.has_reviewed_member() {
                tracing::info!(team = %config.team, %date, "huddle in progress, keeping as stored");
                for member in &meeting.members {
                    itineraries.record_assignment(&member.patient_id, date);
                }
                context.push(meeting.clone());
                report.meetings.push(meeting);
                date += Duration::days(1);
                continue;
            }

            let previous = std::mem::take(&mut meeting.members);
            for member in previous.into_iter().filter(|m| m.reason.is_preserved()) {
                meeting.add_member(member);
            }
            tracing::debug!(%date, preserved = meeting.members.len(), "re-added preserved members");

            if first_rebuild {
                first_rebuild = false;
                if let Some(delay) = config.rollover_after {
                    let rolled = RolloverResolver::new(delay).resolve(&context, date);
                    for member in rolled.carried {
                        meeting.add_member(member);
                    }
                    tracing::debug!(
                        %date,
                        source = ?rolled.source_date,
                        rolled = meeting.count_reason(Reason::Rollover),
                        "applied rollover"
                    );
                }
                self.apply_triggers(config, &context, &mut meeting, now, &mut report);
            }

            let added = fill_by_priority(&mut meeting, &itineraries, target, &quotas);
            tracing::debug!(%date, added, members = meeting.members.len(), "risk fill done");

            for member in &meeting.members {
                itineraries.record_assignment(&member.patient_id, date);
            }

            if self.persist {
                if let Err(err) = self.write(&meeting) {
                    tracing::warn!(team = %config.team, %date, error = %err, "failed to persist huddle");
                    report.errors.push(err);
                } else {
                    tracing::info!(
                        team = %config.team,
                        %date,
                        members = meeting.members.len(),
                        "huddle planned"
                    );
                }
            }

            context.push(meeting.clone());
            report.meetings.push(meeting);
            date += Duration::days(1);
        }

        Ok(report)
    }

    fn apply_triggers(
        &self,
        config: &PlanningConfig,
        context: &[Meeting],
        meeting: &mut Meeting,
        now: DateTime<Utc>,
        report: &mut PlanReport,
    ) {
        for trigger in &config.triggers {
            let Some((start, end)) = EventMatcher::window(trigger, meeting.date, now) else {
                tracing::debug!(trigger = %trigger.name, date = %meeting.date, "lookback starts in the future");
                continue;
            };

            let mut events = match self.store.find_events(&trigger.codes, start, end) {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(
                        trigger = %trigger.name,
                        date = %meeting.date,
                        error = %err,
                        "event lookup failed, skipping trigger"
                    );
                    report.skipped_triggers.push(SkippedTrigger {
                        trigger: trigger.name.clone(),
                        date: meeting.date,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            // Newest event per patient decides the detail text.
            events.sort_by(|a, b| {
                EventMatcher::effective_date(b, trigger)
                    .cmp(&EventMatcher::effective_date(a, trigger))
                    .then_with(|| a.patient_id.cmp(&b.patient_id))
            });

            for event in &events {
                let (effective, matched) = EventMatcher::matches(event, trigger, start, end);
                if !matched {
                    continue;
                }
                if EventMatcher::already_triggered(context, &event.patient_id, meeting.date, effective) {
                    tracing::debug!(patient = %event.patient_id, "event already handled");
                    continue;
                }
                let member = Member::new(
                    event.patient_id.clone(),
                    Reason::RecentEvent,
                    trigger.detail(event, effective),
                )
                .with_trigger_at(effective);
                meeting.add_member(member);
            }
        }
    }

    fn write(&self, meeting: &Meeting) -> Result<()> {
        self.store
            .upsert_meetings(std::slice::from_ref(meeting))
            .into_iter()
            .next()
            .unwrap_or(Ok(()))
            .map_err(|source| PlanError::Persist {
                date: meeting.date,
                source,
            })
    }

    /// Remove a patient from a huddle.
    ///
    /// Returns `None` when the huddle or the member does not exist.
    pub fn cancel_member(&self, meeting_id: &str, patient_id: &str) -> Result<Option<Meeting>> {
        let Some(mut meeting) = self.store.find_meeting_by_id(meeting_id)? else {
            return Ok(None);
        };
        if meeting.remove_member(patient_id).is_none() {
            return Ok(None);
        }
        self.write(&meeting)?;
        tracing::info!(meeting = %meeting_id, patient = %patient_id, "member cancelled");
        Ok(Some(meeting))
    }

    /// Mark a member reviewed. A huddle held today with a reviewed member is
    /// no longer rebuilt by the planner.
    pub fn mark_reviewed(
        &self,
        meeting_id: &str,
        patient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Meeting>> {
        let Some(mut meeting) = self.store.find_meeting_by_id(meeting_id)? else {
            return Ok(None);
        };
        let Some(member) = meeting.members.iter_mut().find(|m| m.patient_id == patient_id) else {
            return Ok(None);
        };
        member.mark_reviewed(at);
        self.write(&meeting)?;
        Ok(Some(meeting))
    }

    /// Add a patient by hand. Manual entries survive every replan.
    pub fn add_manual_member(
        &self,
        meeting_id: &str,
        patient_id: &str,
        note: &str,
    ) -> Result<Option<Meeting>> {
        let Some(mut meeting) = self.store.find_meeting_by_id(meeting_id)? else {
            return Ok(None);
        };
        let outcome = meeting.add_member(Member::new(patient_id, Reason::ManualAddition, note));
        if outcome != AddOutcome::AlreadyPresent {
            self.write(&meeting)?;
        }
        Ok(Some(meeting))
    }
}

/// Walk the ranked candidates and add risk-driven members.
///
/// Stops at the first candidate that is not due once the huddle holds
/// `target` members. Returns how many members were added.
fn fill_by_priority(
    meeting: &mut Meeting,
    itineraries: &Itineraries<'_>,
    target: usize,
    quotas: &HashMap<usize, usize>,
) -> usize {
    let date = meeting.date;
    let ranked = PriorityComparator::new(date).rank(itineraries.iter());
    let mut fresh: HashMap<usize, usize> = HashMap::new();
    let mut added = 0;

    for it in ranked {
        let Some(targets) = it.targets else {
            continue;
        };
        if meeting.contains(&it.patient_id) || date < targets.nearest {
            continue;
        }
        if meeting.members.len() >= target && !it.is_due(date) {
            break;
        }
        if it.never_discussed() {
            if let Some(bucket) = it.bucket {
                let used = fresh.entry(bucket).or_default();
                if *used >= quotas.get(&bucket).copied().unwrap_or(usize::MAX) {
                    continue;
                }
                *used += 1;
            }
        }

        let detail = match it.score {
            Some(score) => format!("Score {score:.1}"),
            None => String::new(),
        };
        meeting.add_member(Member::new(it.patient_id.clone(), Reason::RiskScore, detail));
        added += 1;
    }

    added
}
