//! Core error types for huddle-core.
//!
//! This module defines the error hierarchy using thiserror. Store errors come
//! from the storage collaborator, configuration errors from loading and
//! normalizing team configuration, and plan errors wrap both for the caller
//! of a planning run.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Errors reported by a [`HuddleStore`](crate::store::HuddleStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced record does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Query execution failed
    #[error("Query failed: {0}")]
    Query(String),

    /// A stored record is missing a required reference
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// The store cannot be reached (locked, poisoned, closed)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Team name does not resolve in the store
    #[error("Unknown team: {0}")]
    UnknownTeam(String),

    /// Recurring trigger time could not be parsed
    #[error("Invalid run schedule '{value}' for team '{team}'")]
    BadSchedule { team: String, value: String },
}

/// Errors surfaced by a planning run.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Configuration error, fatal for this team only
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A lookup required for a correct plan failed
    #[error("Lookup failed: {0}")]
    Lookup(#[from] StoreError),

    /// A single meeting could not be written back
    #[error("Failed to persist meeting on {date}: {source}")]
    Persist {
        date: NaiveDate,
        #[source]
        source: StoreError,
    },

    /// Another run holds the lease for this team
    #[error("A planning run for team '{team}' is already in progress")]
    Busy { team: String },

    /// The worker running this team panicked or was cancelled
    #[error("Planning task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Invariant(format!("malformed stored value: {err}"))
    }
}

impl From<tokio::task::JoinError> for PlanError {
    fn from(err: tokio::task::JoinError) -> Self {
        PlanError::Task(err.to_string())
    }
}

/// Result type alias for PlanError
pub type Result<T, E = PlanError> = std::result::Result<T, E>;
