mod config;

pub use config::{
    CadenceConfig, PlannerConfig, PlanningConfig, Spacing, TeamConfig, TriggerConfig,
};

use std::path::PathBuf;

/// Returns `~/.config/huddle[-dev]/` based on HUDDLE_ENV.
///
/// Set HUDDLE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HUDDLE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("huddle-dev")
    } else {
        base_dir.join("huddle")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
