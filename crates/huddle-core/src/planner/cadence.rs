//! Cadence model: maps a risk score to how often a patient should be discussed.
//!
//! Buckets are scanned in configured order and the first one whose inclusive
//! score range contains the score wins. Overlapping buckets are not rejected;
//! the earlier one simply shadows the later one.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One score range and its allowed spacing between discussions, in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceBucket {
    pub min_score: f64,
    pub max_score: f64,
    pub ideal_days: u32,
    pub min_days: u32,
    pub max_days: u32,
    /// Ideal spacing as configured in meeting occurrences, if it was
    #[serde(default)]
    pub ideal_occurrences: Option<u32>,
}

/// Derived discussion window for one patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Targets {
    pub nearest: NaiveDate,
    pub ideal: NaiveDate,
    pub furthest: NaiveDate,
}

impl CadenceBucket {
    pub fn contains(&self, score: f64) -> bool {
        self.min_score <= score && score <= self.max_score
    }

    /// Compute the next discussion window.
    ///
    /// A patient never discussed is eligible from `start` and must be seen
    /// before one full max-spacing window has elapsed.
    pub fn targets(&self, last: Option<NaiveDate>, start: NaiveDate) -> Targets {
        match last {
            Some(last) => Targets {
                nearest: last + Duration::days(self.min_days as i64),
                ideal: last + Duration::days(self.ideal_days as i64),
                furthest: last + Duration::days(self.max_days as i64),
            },
            None => Targets {
                nearest: start,
                ideal: start,
                furthest: start + Duration::days(self.max_days as i64 - 1),
            },
        }
    }

    /// Ideal spacing expressed in meeting occurrences.
    ///
    /// Uses the configured occurrence count when there is one; a spacing
    /// given in days is converted through the weekly meeting rate.
    pub fn occurrences_per_ideal(&self, meetings_per_week: usize) -> f64 {
        match self.ideal_occurrences {
            Some(n) => n as f64,
            None => self.ideal_days as f64 * meetings_per_week as f64 / 7.0,
        }
    }
}

/// Ordered set of cadence buckets for one team.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cadence {
    buckets: Vec<CadenceBucket>,
    meetings_per_week: usize,
}

impl Cadence {
    pub fn new(buckets: Vec<CadenceBucket>, meetings_per_week: usize) -> Self {
        Self {
            buckets,
            meetings_per_week,
        }
    }

    pub fn buckets(&self) -> &[CadenceBucket] {
        &self.buckets
    }

    /// Index of the first bucket containing `score`.
    pub fn bucket_index(&self, score: f64) -> Option<usize> {
        self.buckets.iter().position(|b| b.contains(score))
    }

    pub fn bucket_for(&self, score: f64) -> Option<&CadenceBucket> {
        self.bucket_index(score).map(|i| &self.buckets[i])
    }

    /// Lowest and highest score covered by any bucket.
    pub fn score_range(&self) -> Option<(f64, f64)> {
        let min = self.buckets.iter().map(|b| b.min_score).reduce(f64::min)?;
        let max = self.buckets.iter().map(|b| b.max_score).reduce(f64::max)?;
        Some((min, max))
    }

    /// Average number of risk-driven discussions per huddle that keeps every
    /// bucketed patient on their ideal cadence.
    pub fn target_size<I>(&self, scores: I) -> usize
    where
        I: IntoIterator<Item = f64>,
    {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for score in scores {
            if let Some(idx) = self.bucket_index(score) {
                *counts.entry(idx).or_default() += 1;
            }
        }

        let total: f64 = counts
            .iter()
            .map(|(&idx, &count)| {
                let per = self.buckets[idx].occurrences_per_ideal(self.meetings_per_week);
                if per > 0.0 {
                    count as f64 / per
                } else {
                    count as f64
                }
            })
            .sum();

        total.ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn high() -> CadenceBucket {
        CadenceBucket {
            min_score: 8.0,
            max_score: 10.0,
            ideal_days: 6,
            min_days: 5,
            max_days: 7,
            ideal_occurrences: None,
        }
    }

    fn low() -> CadenceBucket {
        CadenceBucket {
            min_score: 0.0,
            max_score: 7.99,
            ideal_days: 28,
            min_days: 14,
            max_days: 42,
            ideal_occurrences: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_matching_bucket_wins() {
        let overlapping = CadenceBucket {
            min_score: 5.0,
            max_score: 9.0,
            ..low()
        };
        let cadence = Cadence::new(vec![high(), overlapping], 1);
        assert_eq!(cadence.bucket_index(8.5), Some(0));
        assert_eq!(cadence.bucket_index(6.0), Some(1));
        assert_eq!(cadence.bucket_index(11.0), None);
    }

    #[test]
    fn bucket_bounds_are_inclusive() {
        let cadence = Cadence::new(vec![high()], 1);
        assert!(cadence.bucket_for(8.0).is_some());
        assert!(cadence.bucket_for(10.0).is_some());
        assert!(cadence.bucket_for(7.999).is_none());
    }

    #[test]
    fn targets_from_last_discussion() {
        let last = date(2026, 3, 2);
        let t = high().targets(Some(last), date(2026, 3, 9));
        assert_eq!(t.nearest, date(2026, 3, 7));
        assert_eq!(t.ideal, date(2026, 3, 8));
        assert_eq!(t.furthest, date(2026, 3, 9));
    }

    #[test]
    fn never_discussed_is_eligible_immediately() {
        let start = date(2026, 3, 9);
        let t = high().targets(None, start);
        assert_eq!(t.nearest, start);
        assert_eq!(t.ideal, start);
        assert_eq!(t.furthest, date(2026, 3, 15));
    }

    #[test]
    fn target_size_rounds_up_over_buckets() {
        // Two meetings a week. High bucket: 6 days ~ 1.71 occurrences.
        // Low bucket: 28 days = 8 occurrences.
        let cadence = Cadence::new(vec![high(), low()], 2);
        let scores = vec![9.0, 9.5, 8.0, 1.0, 2.0, 3.0, 4.0, 20.0];
        // 3 / 1.714 + 4 / 8 = 1.75 + 0.5 = 2.25
        assert_eq!(cadence.target_size(scores), 3);
    }

    #[test]
    fn target_size_uses_configured_occurrences() {
        // 3 occurrences at two meetings a week normalizes to 11 days, which
        // would read back as 3.14 occurrences.
        let bucket = CadenceBucket {
            ideal_days: 11,
            min_days: 7,
            max_days: 14,
            ideal_occurrences: Some(3),
            ..high()
        };
        assert_eq!(bucket.occurrences_per_ideal(2), 3.0);
        let cadence = Cadence::new(vec![bucket], 2);
        assert_eq!(cadence.target_size(vec![9.0; 66]), 22);
    }

    #[test]
    fn target_size_is_zero_without_population() {
        let cadence = Cadence::new(vec![high()], 2);
        assert_eq!(cadence.target_size(Vec::<f64>::new()), 0);
        assert_eq!(cadence.target_size(vec![1.0]), 0);
    }

    #[test]
    fn score_range_spans_all_buckets() {
        let cadence = Cadence::new(vec![high(), low()], 1);
        assert_eq!(cadence.score_range(), Some((0.0, 10.0)));
        assert_eq!(Cadence::default().score_range(), None);
    }
}
