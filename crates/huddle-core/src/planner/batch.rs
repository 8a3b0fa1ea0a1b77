//! Planning many teams at once.
//!
//! Each team runs as its own blocking task over the shared store. A failing
//! or panicking team is reported and never stops the others. Runs for the
//! same team are serialized through [`TeamLeases`]: a second run while one
//! is in flight fails fast with [`PlanError::Busy`]. A team listed twice
//! in one batch is planned once; later entries are configuration errors.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{HuddlePlanner, PlanReport};
use crate::error::{ConfigError, PlanError};
use crate::storage::TeamConfig;
use crate::store::HuddleStore;

/// In-process leases, one per team name.
#[derive(Debug, Default)]
pub struct TeamLeases {
    held: Mutex<HashSet<String>>,
}

/// Held lease; released on drop.
#[derive(Debug)]
pub struct TeamLease {
    leases: Arc<TeamLeases>,
    team: String,
}

impl TeamLeases {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn acquire(self: &Arc<Self>, team: &str) -> Result<TeamLease, PlanError> {
        if !self.held().insert(team.to_string()) {
            return Err(PlanError::Busy {
                team: team.to_string(),
            });
        }
        Ok(TeamLease {
            leases: Arc::clone(self),
            team: team.to_string(),
        })
    }

    pub fn is_held(&self, team: &str) -> bool {
        self.held().contains(team)
    }
}

impl TeamLease {
    pub fn team(&self) -> &str {
        &self.team
    }
}

impl Drop for TeamLease {
    fn drop(&mut self) {
        self.leases.held().remove(&self.team);
    }
}

/// Result of a batch, one entry per configured team in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<(String, Result<PlanReport, PlanError>)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &PlanReport> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &PlanError)> {
        self.results
            .iter()
            .filter_map(|(team, r)| r.as_ref().err().map(|e| (team.as_str(), e)))
    }

    /// Every team planned with no persistence failure or skipped trigger.
    pub fn is_clean(&self) -> bool {
        self.results
            .iter()
            .all(|(_, r)| r.as_ref().is_ok_and(PlanReport::is_clean))
    }
}

/// Runs team configurations concurrently over one store.
pub struct BatchRunner {
    store: Arc<dyn HuddleStore>,
    leases: Arc<TeamLeases>,
    persist: bool,
}

impl BatchRunner {
    pub fn new(store: Arc<dyn HuddleStore>, leases: Arc<TeamLeases>) -> Self {
        Self {
            store,
            leases,
            persist: true,
        }
    }

    /// Plan without writing huddles back.
    pub fn dry_run(mut self) -> Self {
        self.persist = false;
        self
    }

    pub async fn run(&self, teams: &[TeamConfig]) -> BatchReport {
        self.run_at(teams, Utc::now()).await
    }

    pub async fn run_at(&self, teams: &[TeamConfig], now: DateTime<Utc>) -> BatchReport {
        let mut pending = Vec::with_capacity(teams.len());
        let mut seen = HashSet::new();

        for team in teams {
            if !seen.insert(team.team.as_str()) {
                tracing::warn!(team = %team.team, "team listed more than once in batch");
                let err = ConfigError::InvalidValue {
                    key: format!("{}.team", team.team),
                    message: "team listed more than once".into(),
                };
                pending.push((team.team.clone(), Err(PlanError::from(err))));
                continue;
            }
            let config = match team.normalize() {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(team = %team.team, error = %err, "skipping team with invalid configuration");
                    pending.push((team.team.clone(), Err(PlanError::from(err))));
                    continue;
                }
            };

            let store = Arc::clone(&self.store);
            let leases = Arc::clone(&self.leases);
            let persist = self.persist;
            let handle = tokio::task::spawn_blocking(move || {
                let _lease = leases.acquire(&config.team)?;
                let planner = if persist {
                    HuddlePlanner::new(store)
                } else {
                    HuddlePlanner::dry_run(store)
                };
                planner.plan_huddles_at(&config, now)
            });
            pending.push((team.team.clone(), Ok(handle)));
        }

        let mut report = BatchReport::default();
        for (team, unit) in pending {
            let result = match unit {
                Ok(handle) => handle.await.unwrap_or_else(|e| Err(PlanError::from(e))),
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                tracing::warn!(team = %team, error = %err, "team planning failed");
            }
            report.results.push((team, result));
        }

        tracing::info!(
            teams = report.results.len(),
            failed = report.failed().count(),
            "batch finished"
        );
        report
    }
}
