//! Priority ordering of patients competing for huddle slots.
//!
//! Candidates are compared on these keys, in order, falling through on ties:
//! - Dueness: due patients first, the most overdue first among them
//! - Next ideal date: earlier first, none last
//! - Score: higher first, none last
//! - Furthest allowed date: earlier first, none last
//! - Last discussion: never discussed first, then oldest first
//! - Patient id
//!
//! The comparator is pure and total, so the ranking never depends on the
//! order in which itineraries come out of a map.

use std::cmp::Ordering;

use chrono::NaiveDate;

use super::itinerary::Itinerary;

/// Order `Some` values ascending with `None` after them.
fn none_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Comparator for the huddle held on a given date.
#[derive(Debug, Clone, Copy)]
pub struct PriorityComparator {
    on: NaiveDate,
}

impl PriorityComparator {
    pub fn new(on: NaiveDate) -> Self {
        Self { on }
    }

    pub fn on(&self) -> NaiveDate {
        self.on
    }

    fn dueness(&self, a: &Itinerary, b: &Itinerary) -> Ordering {
        match (a.is_due(self.on), b.is_due(self.on)) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => none_last(a.furthest(), b.furthest()),
            (false, false) => Ordering::Equal,
        }
    }

    fn score(a: &Itinerary, b: &Itinerary) -> Ordering {
        match (a.score, b.score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    pub fn compare(&self, a: &Itinerary, b: &Itinerary) -> Ordering {
        self.dueness(a, b)
            .then_with(|| none_last(a.ideal(), b.ideal()))
            .then_with(|| Self::score(a, b))
            .then_with(|| none_last(a.furthest(), b.furthest()))
            // Option orders None before Some, which puts never-discussed first.
            .then_with(|| a.last_discussed.cmp(&b.last_discussed))
            .then_with(|| a.patient_id.cmp(&b.patient_id))
    }

    /// Materialize and sort candidates, highest priority first.
    pub fn rank<'i, I>(&self, candidates: I) -> Vec<&'i Itinerary>
    where
        I: IntoIterator<Item = &'i Itinerary>,
    {
        let mut ranked: Vec<&Itinerary> = candidates.into_iter().collect();
        ranked.sort_by(|a, b| self.compare(a, b));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::cadence::Targets;
    use proptest::prelude::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn it(id: &str, score: Option<f64>, last: Option<u32>, targets: Option<(u32, u32, u32)>) -> Itinerary {
        Itinerary {
            patient_id: id.into(),
            score,
            bucket: targets.map(|_| 0),
            last_discussed: last.map(date),
            targets: targets.map(|(n, i, f)| Targets {
                nearest: date(n),
                ideal: date(i),
                furthest: date(f),
            }),
        }
    }

    fn ids(ranked: &[&Itinerary]) -> Vec<String> {
        ranked.iter().map(|i| i.patient_id.clone()).collect()
    }

    #[test]
    fn due_patient_beats_higher_score() {
        let cmp = PriorityComparator::new(date(16));
        let due = it("due", Some(8.1), Some(9), Some((14, 15, 16)));
        let hot = it("hot", Some(10.0), Some(10), Some((10, 10, 17)));
        assert_eq!(cmp.compare(&due, &hot), Ordering::Less);
    }

    #[test]
    fn more_overdue_first() {
        let cmp = PriorityComparator::new(date(20));
        let a = it("a", Some(9.0), Some(9), Some((14, 15, 16)));
        let b = it("b", Some(9.0), Some(7), Some((12, 13, 14)));
        assert_eq!(ids(&cmp.rank([&a, &b])), vec!["b", "a"]);
    }

    #[test]
    fn earlier_ideal_then_higher_score() {
        let cmp = PriorityComparator::new(date(10));
        let a = it("a", Some(5.0), Some(1), Some((5, 12, 20)));
        let b = it("b", Some(9.0), Some(1), Some((5, 13, 20)));
        let c = it("c", Some(9.5), Some(1), Some((5, 13, 20)));
        assert_eq!(ids(&cmp.rank([&b, &c, &a])), vec!["a", "c", "b"]);
    }

    #[test]
    fn missing_values_sort_last() {
        let cmp = PriorityComparator::new(date(10));
        let scored = it("a", Some(1.0), None, None);
        let unscored = it("b", None, None, None);
        let targeted = it("c", None, None, Some((5, 12, 20)));
        assert_eq!(ids(&cmp.rank([&unscored, &scored, &targeted])), vec!["c", "a", "b"]);
    }

    #[test]
    fn never_discussed_before_older_before_recent() {
        let cmp = PriorityComparator::new(date(10));
        let never = it("z", Some(9.0), None, Some((12, 15, 20)));
        let old = it("y", Some(9.0), Some(1), Some((12, 15, 20)));
        let recent = it("x", Some(9.0), Some(3), Some((12, 15, 20)));
        assert_eq!(ids(&cmp.rank([&recent, &old, &never])), vec!["z", "y", "x"]);
    }

    #[test]
    fn identifier_breaks_full_ties() {
        let cmp = PriorityComparator::new(date(10));
        let a = it("p-2", Some(9.0), Some(1), Some((5, 12, 20)));
        let b = it("p-1", Some(9.0), Some(1), Some((5, 12, 20)));
        assert_eq!(ids(&cmp.rank([&a, &b])), vec!["p-1", "p-2"]);
    }

    fn arb_itinerary() -> impl Strategy<Value = Itinerary> {
        (
            "[a-e]{1,2}",
            proptest::option::of(0.0f64..10.0),
            proptest::option::of(1u32..10),
            proptest::option::of((1u32..10, 0u32..5, 0u32..5)),
        )
            .prop_map(|(id, score, last, t)| {
                let targets = t.map(|(n, di, df)| (n, n + di, n + di + df));
                it(&id, score, last, targets)
            })
    }

    proptest! {
        #[test]
        fn ranking_ignores_input_order(mut items in proptest::collection::vec(arb_itinerary(), 0..20)) {
            items.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
            items.dedup_by(|a, b| a.patient_id == b.patient_id);
            let cmp = PriorityComparator::new(date(12));
            let forward: Vec<Itinerary> = cmp.rank(items.iter()).into_iter().cloned().collect();
            items.reverse();
            let backward: Vec<Itinerary> = cmp.rank(items.iter()).into_iter().cloned().collect();
            prop_assert_eq!(forward, backward);
        }
    }
}
