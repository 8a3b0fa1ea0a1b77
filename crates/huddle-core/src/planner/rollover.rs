//! Rollover of unreviewed huddle members.
//!
//! Patients listed on an earlier huddle who were never marked reviewed are
//! carried into the huddle being planned, with reason `Rollover`.
//!
//! # Usage
//! ```rust,ignore
//! use huddle_core::planner::rollover::RolloverResolver;
//! use huddle_core::storage::Spacing;
//!
//! let resolver = RolloverResolver::new(Spacing::Occurrences(1));
//! let result = resolver.resolve(&history, next_huddle_date);
//! ```

use chrono::{Duration, NaiveDate};

use crate::huddle::{Meeting, Member, Reason};
use crate::storage::Spacing;

/// Members carried forward from one earlier huddle.
#[derive(Debug, Clone, Default)]
pub struct RolloverResult {
    /// Date of the huddle the members came from
    pub source_date: Option<NaiveDate>,
    /// New `Rollover` members for the current huddle
    pub carried: Vec<Member>,
    /// Members of the source huddle that were reviewed and stay behind
    pub reviewed: usize,
}

/// Resolver for unreviewed members.
pub struct RolloverResolver {
    delay: Spacing,
}

impl RolloverResolver {
    pub fn new(delay: Spacing) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Spacing {
        self.delay
    }

    /// Huddle whose unreviewed members roll into the huddle on `current`.
    ///
    /// A day delay picks the huddle dated exactly that many days earlier; an
    /// occurrence delay picks the N-th most recent huddle before `current`.
    pub fn source<'m>(&self, history: &'m [Meeting], current: NaiveDate) -> Option<&'m Meeting> {
        match self.delay {
            Spacing::Days(n) => {
                let date = current - Duration::days(n as i64);
                history.iter().find(|m| m.date == date && m.date < current)
            }
            Spacing::Occurrences(0) => None,
            Spacing::Occurrences(n) => {
                let mut prior: Vec<&Meeting> =
                    history.iter().filter(|m| m.date < current).collect();
                prior.sort_by(|a, b| b.date.cmp(&a.date));
                prior.get(n as usize - 1).copied()
            }
        }
    }

    /// Detail text for a member rolled over from the huddle on `from`.
    pub fn detail(prior: &Member, from: NaiveDate) -> String {
        let from = from.format("%Y-%m-%d");
        match prior.reason {
            Reason::Rollover => prior.detail.clone(),
            Reason::ManualAddition => {
                format!("Rolled Over from {from} (Manually Added - {})", prior.detail)
            }
            _ => format!("Rolled Over from {from} ({})", prior.detail),
        }
    }

    /// Turn every unreviewed member of `source` into a `Rollover` member.
    pub fn carry(source: &Meeting) -> Vec<Member> {
        source
            .members
            .iter()
            .filter(|m| !m.reviewed)
            .map(|m| Member::new(m.patient_id.clone(), Reason::Rollover, Self::detail(m, source.date)))
            .collect()
    }

    pub fn resolve(&self, history: &[Meeting], current: NaiveDate) -> RolloverResult {
        let Some(source) = self.source(history, current) else {
            return RolloverResult::default();
        };

        RolloverResult {
            source_date: Some(source.date),
            carried: Self::carry(source),
            reviewed: source.members.iter().filter(|m| m.reviewed).count(),
        }
    }
}
