use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use huddle_core::planner::{BatchReport, PlanReport};
use huddle_core::{BatchRunner, HuddleStore, PlannerConfig, SqliteStore, TeamLeases};
use serde_json::{json, Value};

#[derive(Args)]
pub struct PlanArgs {
    /// Plan only this team
    #[arg(long)]
    team: Option<String>,
    /// Read configuration from this file instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
    /// Compute huddles without saving them
    #[arg(long)]
    dry_run: bool,
}

fn report_json(report: &PlanReport) -> Value {
    json!({
        "team": report.team,
        "target_size": report.target_size,
        "meetings": report.meetings,
        "errors": report.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "skipped_triggers": report
            .skipped_triggers
            .iter()
            .map(|s| json!({ "trigger": s.trigger, "date": s.date, "reason": s.reason }))
            .collect::<Vec<_>>(),
    })
}

fn batch_json(batch: &BatchReport) -> Value {
    Value::Array(
        batch
            .results
            .iter()
            .map(|(team, result)| match result {
                Ok(report) => report_json(report),
                Err(e) => json!({ "team": team, "error": e.to_string() }),
            })
            .collect(),
    )
}

pub fn run(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => PlannerConfig::load_from(path)?,
        None => PlannerConfig::load()?,
    };

    let teams = match &args.team {
        Some(name) => {
            let team = config
                .team(name)
                .ok_or_else(|| format!("team not configured: {name}"))?;
            vec![team.clone()]
        }
        None => config.teams.clone(),
    };

    let store: Arc<dyn HuddleStore> = Arc::new(SqliteStore::open()?);
    let mut runner = BatchRunner::new(store, TeamLeases::new());
    if args.dry_run {
        runner = runner.dry_run();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let batch = runtime.block_on(runner.run(&teams));

    println!("{}", serde_json::to_string_pretty(&batch_json(&batch))?);

    let failed = batch.failed().count();
    if failed > 0 {
        return Err(format!("{failed} team(s) failed to plan").into());
    }
    Ok(())
}
