use std::path::PathBuf;

use clap::Subcommand;
use huddle_core::PlannerConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the configuration file location
    Path,
    /// Print the configuration as JSON
    Show {
        /// Read this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Validate every team and print the next scheduled run
    Check {
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn load(file: Option<PathBuf>) -> Result<PlannerConfig, Box<dyn std::error::Error>> {
    Ok(match file {
        Some(path) => PlannerConfig::load_from(&path)?,
        None => PlannerConfig::load()?,
    })
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Path => {
            println!("{}", PlannerConfig::path()?.display());
        }
        ConfigAction::Show { file } => {
            let config = load(file)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Check { file } => {
            let config = load(file)?;
            let now = chrono::Utc::now();
            let mut invalid = 0;
            for team in &config.teams {
                match team.normalize() {
                    Ok(planning) => match planning.next_run_after(now) {
                        Some(next) => println!("{}: ok, next run {}", team.team, next.to_rfc3339()),
                        None => println!("{}: ok, no recurring run", team.team),
                    },
                    Err(e) => {
                        invalid += 1;
                        println!("{}: {e}", team.team);
                    }
                }
            }
            if invalid > 0 {
                return Err(format!("{invalid} team(s) have invalid configuration").into());
            }
        }
    }
    Ok(())
}
