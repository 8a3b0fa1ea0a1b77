//! TOML-based planner configuration.
//!
//! One `[[teams]]` table per care team:
//! - Meeting weekdays and how many future huddles to plan
//! - Cadence buckets mapping risk scores to discussion spacing
//! - Clinical event triggers
//! - Rollover delay for unreviewed patients
//! - Time of day for the recurring planner trigger
//!
//! Configuration is stored at `~/.config/huddle/huddles.toml`.
//!
//! Spacings may be written in days or in meeting occurrences:
//!
//! ```toml
//! ideal = { days = 6 }
//! max = { occurrences = 2 }
//! ```
//!
//! Both forms are normalized to whole days by [`TeamConfig::normalize`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::planner::cadence::{Cadence, CadenceBucket};
use crate::planner::trigger::EventTrigger;

/// Upper bound for any spacing or lookback, in days.
pub const MAX_SPACING_DAYS: u32 = 3650;

/// Distance between two discussions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    Days(u32),
    Occurrences(u32),
}

impl Spacing {
    /// Convert to whole days for a team meeting `meetings_per_week` times.
    pub fn to_days(self, meetings_per_week: usize) -> u32 {
        match self {
            Spacing::Days(n) => n,
            Spacing::Occurrences(n) => {
                let per_week = meetings_per_week.max(1) as u32;
                n.saturating_mul(7).div_ceil(per_week)
            }
        }
    }
}

/// One cadence bucket as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceConfig {
    pub min_score: f64,
    pub max_score: f64,
    pub ideal: Spacing,
    pub min: Spacing,
    pub max: Spacing,
}

/// One event trigger as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_trigger_name")]
    pub name: String,
    pub lookback_days: u32,
    pub codes: Vec<String>,
    #[serde(default)]
    pub use_end_date: bool,
}

/// Configuration of one care team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub team: String,
    pub weekdays: Vec<Weekday>,
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
    #[serde(default = "default_risk_method")]
    pub risk_method: String,
    #[serde(default)]
    pub cadences: Vec<CadenceConfig>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    /// Unreviewed members roll forward after this delay.
    #[serde(default)]
    pub rollover_after: Option<Spacing>,
    /// "HH:MM" (UTC) for the recurring planner trigger.
    #[serde(default)]
    pub run_at: Option<String>,
}

/// All team configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
}

fn default_trigger_name() -> String {
    "Recent event".into()
}
fn default_lookahead() -> usize {
    4
}
fn default_risk_method() -> String {
    "risk".into()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            teams: vec![TeamConfig {
                team: "Community Care".into(),
                weekdays: vec![Weekday::Mon, Weekday::Thu],
                lookahead: default_lookahead(),
                risk_method: default_risk_method(),
                cadences: vec![
                    CadenceConfig {
                        min_score: 8.0,
                        max_score: 10.0,
                        ideal: Spacing::Days(7),
                        min: Spacing::Days(5),
                        max: Spacing::Days(10),
                    },
                    CadenceConfig {
                        min_score: 5.0,
                        max_score: 7.99,
                        ideal: Spacing::Occurrences(8),
                        min: Spacing::Occurrences(6),
                        max: Spacing::Occurrences(12),
                    },
                ],
                triggers: vec![TriggerConfig {
                    name: "Hospital discharge".into(),
                    lookback_days: 7,
                    codes: vec!["HOSP".into()],
                    use_end_date: true,
                }],
                rollover_after: Some(Spacing::Occurrences(1)),
                run_at: Some("02:00".into()),
            }],
        }
    }
}

impl PlannerConfig {
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/huddle"),
            message: e.to_string(),
        })?;
        Ok(dir.join("huddles.toml"))
    }

    /// Load from the data directory, writing the defaults if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            return Self::load_from(&path);
        }
        let cfg = Self::default();
        cfg.save_to(&path)?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    pub fn team(&self, name: &str) -> Option<&TeamConfig> {
        self.teams.iter().find(|t| t.team == name)
    }
}

/// Validated configuration consumed by the planner, all spacings in days.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningConfig {
    pub team: String,
    pub weekdays: Vec<Weekday>,
    pub lookahead: usize,
    pub risk_method: String,
    pub cadence: Cadence,
    pub triggers: Vec<EventTrigger>,
    pub rollover_after: Option<Spacing>,
    pub run_at: Option<NaiveTime>,
}

impl TeamConfig {
    fn invalid(&self, key: impl Into<String>, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            key: format!("{}.{}", self.team, key.into()),
            message: message.into(),
        }
    }

    /// Validate and convert to the planner's representation.
    pub fn normalize(&self) -> Result<PlanningConfig, ConfigError> {
        if self.team.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "team".into(),
                message: "team name is empty".into(),
            });
        }

        let weekdays: Vec<Weekday> = {
            let mut days = self.weekdays.clone();
            days.sort_by_key(|d| d.num_days_from_monday());
            days.dedup();
            days
        };
        if weekdays.is_empty() {
            return Err(self.invalid("weekdays", "at least one meeting weekday is required"));
        }
        if self.lookahead == 0 {
            return Err(self.invalid("lookahead", "must be at least 1"));
        }

        let per_week = weekdays.len();
        let mut buckets = Vec::with_capacity(self.cadences.len());
        for (i, c) in self.cadences.iter().enumerate() {
            let key = format!("cadences[{i}]");
            if !(c.min_score <= c.max_score) {
                return Err(self.invalid(key, "min_score must not exceed max_score"));
            }
            let bucket = CadenceBucket {
                min_score: c.min_score,
                max_score: c.max_score,
                ideal_days: c.ideal.to_days(per_week),
                min_days: c.min.to_days(per_week),
                max_days: c.max.to_days(per_week),
                ideal_occurrences: match c.ideal {
                    Spacing::Occurrences(n) => Some(n),
                    Spacing::Days(_) => None,
                },
            };
            let spacings = [
                ("ideal", bucket.ideal_days),
                ("min", bucket.min_days),
                ("max", bucket.max_days),
            ];
            for (name, days) in spacings {
                if days > MAX_SPACING_DAYS {
                    return Err(self.invalid(
                        format!("{key}.{name}"),
                        format!("spacing exceeds {MAX_SPACING_DAYS} days"),
                    ));
                }
            }
            if bucket.ideal_days == 0 || bucket.max_days == 0 {
                return Err(self.invalid(key, "ideal and max spacing must be positive"));
            }
            if bucket.min_days > bucket.ideal_days || bucket.ideal_days > bucket.max_days {
                return Err(self.invalid(key, "spacing must satisfy min <= ideal <= max"));
            }
            buckets.push(bucket);
        }

        let mut triggers = Vec::with_capacity(self.triggers.len());
        for (i, t) in self.triggers.iter().enumerate() {
            let codes: BTreeSet<String> = t
                .codes
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if codes.is_empty() {
                return Err(self.invalid(format!("triggers[{i}]"), "code set is empty"));
            }
            if t.lookback_days > MAX_SPACING_DAYS {
                return Err(self.invalid(
                    format!("triggers[{i}].lookback_days"),
                    format!("lookback exceeds {MAX_SPACING_DAYS} days"),
                ));
            }
            triggers.push(EventTrigger {
                name: t.name.clone(),
                lookback_days: t.lookback_days,
                codes,
                use_end_date: t.use_end_date,
            });
        }

        if let Some(delay) = self.rollover_after {
            let n = match delay {
                Spacing::Days(n) | Spacing::Occurrences(n) => n,
            };
            if n > MAX_SPACING_DAYS {
                return Err(self.invalid("rollover_after", format!("delay exceeds {MAX_SPACING_DAYS}")));
            }
        }

        let run_at = match &self.run_at {
            Some(value) => Some(NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
                ConfigError::BadSchedule {
                    team: self.team.clone(),
                    value: value.clone(),
                }
            })?),
            None => None,
        };

        Ok(PlanningConfig {
            team: self.team.clone(),
            cadence: Cadence::new(buckets, per_week),
            weekdays,
            lookahead: self.lookahead,
            risk_method: self.risk_method.clone(),
            triggers,
            rollover_after: self.rollover_after,
            run_at,
        })
    }
}

impl PlanningConfig {
    pub fn is_meeting_day(&self, date: NaiveDate) -> bool {
        self.weekdays.contains(&date.weekday())
    }

    /// Meeting days in `[from, until)`.
    pub fn meeting_days_between(&self, from: NaiveDate, until: NaiveDate) -> usize {
        from.iter_days()
            .take_while(|d| *d < until)
            .filter(|d| self.is_meeting_day(*d))
            .count()
    }

    /// Next time the recurring planner trigger should fire after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let at = self.run_at?;
        (0..=7)
            .map(|offset| now.date_naive() + Duration::days(offset))
            .filter(|d| self.is_meeting_day(*d))
            .map(|d| d.and_time(at).and_utc())
            .find(|t| *t > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn team() -> TeamConfig {
        PlannerConfig::default().teams.remove(0)
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = PlannerConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed = PlannerConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn parses_both_spacing_forms() {
        let cfg = PlannerConfig::parse(
            r#"
            [[teams]]
            team = "North"
            weekdays = ["Mon", "Wed", "Fri"]
            lookahead = 6

            [[teams.cadences]]
            min_score = 8.0
            max_score = 10.0
            ideal = { days = 6 }
            min = { days = 5 }
            max = { occurrences = 3 }

            [[teams.triggers]]
            lookback_days = 7
            codes = ["HOSP"]
            use_end_date = true
            "#,
        )
        .unwrap();

        let team = &cfg.teams[0];
        assert_eq!(team.cadences[0].ideal, Spacing::Days(6));
        assert_eq!(team.cadences[0].max, Spacing::Occurrences(3));
        assert_eq!(team.risk_method, "risk");
        assert_eq!(team.triggers[0].name, "Recent event");

        let planning = team.normalize().unwrap();
        // 3 occurrences at 3 meetings a week = 7 days
        assert_eq!(planning.cadence.buckets()[0].max_days, 7);
    }

    #[test]
    fn occurrences_round_up_to_days() {
        assert_eq!(Spacing::Occurrences(1).to_days(2), 4);
        assert_eq!(Spacing::Occurrences(2).to_days(2), 7);
        assert_eq!(Spacing::Occurrences(2).to_days(1), 14);
        assert_eq!(Spacing::Days(3).to_days(5), 3);
    }

    #[test]
    fn normalize_rejects_inverted_spacing() {
        let mut t = team();
        t.cadences[0].min = Spacing::Days(9);
        let err = t.normalize().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn normalize_rejects_missing_weekdays_and_empty_codes() {
        let mut t = team();
        t.weekdays.clear();
        assert!(t.normalize().is_err());

        let mut t = team();
        t.triggers[0].codes = vec![" ".into()];
        assert!(t.normalize().is_err());
    }

    #[test]
    fn normalize_rejects_oversized_spacing_and_lookback() {
        let mut t = team();
        t.cadences[0].max = Spacing::Occurrences(u32::MAX);
        let err = t.normalize().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key.ends_with("max")));

        let mut t = team();
        t.triggers[0].lookback_days = u32::MAX;
        assert!(matches!(t.normalize(), Err(ConfigError::InvalidValue { .. })));

        let mut t = team();
        t.rollover_after = Some(Spacing::Days(u32::MAX));
        assert!(matches!(t.normalize(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn occurrence_ideal_is_kept_for_target_size() {
        let mut t = team();
        t.cadences[0].ideal = Spacing::Occurrences(2);
        t.cadences[0].max = Spacing::Occurrences(4);
        let planning = t.normalize().unwrap();
        let bucket = &planning.cadence.buckets()[0];
        assert_eq!(bucket.ideal_occurrences, Some(2));
        assert_eq!(bucket.ideal_days, 7);
    }

    #[test]
    fn bad_run_at_is_a_schedule_error() {
        let mut t = team();
        t.run_at = Some("25:99".into());
        assert!(matches!(t.normalize(), Err(ConfigError::BadSchedule { .. })));
    }

    #[test]
    fn meeting_days_are_counted_half_open() {
        let p = team().normalize().unwrap();
        let mon = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(p.is_meeting_day(mon));
        assert_eq!(p.meeting_days_between(mon, mon + Duration::days(7)), 2);
        assert_eq!(p.meeting_days_between(mon, mon + Duration::days(3)), 1);
        assert_eq!(p.meeting_days_between(mon, mon), 0);
    }

    #[test]
    fn next_run_skips_to_following_meeting_day() {
        let p = team().normalize().unwrap();
        // Monday 2026-03-02 03:00, after the 02:00 run
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap();
        let next = p.next_run_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 5, 2, 0, 0).unwrap());
    }

    #[test]
    fn save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huddles.toml");
        let cfg = PlannerConfig::default();
        cfg.save_to(&path).unwrap();
        assert_eq!(PlannerConfig::load_from(&path).unwrap(), cfg);
        assert!(cfg.team("Community Care").is_some());
    }
}
