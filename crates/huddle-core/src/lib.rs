//! # Huddle Core Library
//!
//! This library provides the core logic for planning recurring care-team
//! huddles: deciding, for each upcoming meeting of a team, which patients
//! must be discussed and why. All operations are available through the
//! standalone `huddle-cli` binary built over the same library.
//!
//! ## Architecture
//!
//! - **Planner**: cadence buckets, per-run itineraries, priority ordering,
//!   event triggers and rollover, driven day by day by [`HuddlePlanner`]
//! - **Store**: the [`HuddleStore`] contract with SQLite and in-memory
//!   implementations
//! - **Storage**: TOML configuration and the data directory
//!
//! ## Key Components
//!
//! - [`HuddlePlanner`]: fills and persists upcoming huddles
//! - [`BatchRunner`]: plans many teams concurrently
//! - [`Meeting`] / [`Member`]: the huddle record
//! - [`PlannerConfig`]: team configuration

pub mod error;
pub mod huddle;
pub mod planner;
pub mod storage;
pub mod store;

pub use error::{ConfigError, PlanError, StoreError};
pub use huddle::{AddOutcome, Meeting, Member, Reason};
pub use planner::{BatchReport, BatchRunner, HuddlePlanner, PlanReport, SkippedTrigger, TeamLeases};
pub use storage::{PlannerConfig, PlanningConfig, Spacing, TeamConfig};
pub use store::{EventRecord, HuddleStore, MemoryStore, ScoreRecord, SqliteStore};
