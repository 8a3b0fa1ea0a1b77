use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "huddle-cli", version, about = "Care-team huddle planner")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan upcoming huddles for one or all teams
    Plan(commands::plan::PlanArgs),
    /// Show the huddle of a team on a date
    Show {
        /// Team name
        #[arg(long)]
        team: String,
        /// Huddle date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
    /// Remove a patient from a huddle
    Cancel {
        #[arg(long)]
        meeting: String,
        #[arg(long)]
        patient: String,
    },
    /// Mark a patient reviewed
    Review {
        #[arg(long)]
        meeting: String,
        #[arg(long)]
        patient: String,
    },
    /// Add a patient to a huddle by hand
    Add {
        #[arg(long)]
        meeting: String,
        #[arg(long)]
        patient: String,
        /// Reason shown on the huddle
        #[arg(long, default_value = "Manually added")]
        note: String,
    },
    /// Team management
    Team {
        #[command(subcommand)]
        action: commands::data::TeamAction,
    },
    /// Risk score entry
    Score {
        #[command(subcommand)]
        action: commands::data::ScoreAction,
    },
    /// Clinical event entry
    Event {
        #[command(subcommand)]
        action: commands::data::EventAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Show { team, date } => commands::meeting::show(&team, &date),
        Commands::Cancel { meeting, patient } => commands::meeting::cancel(&meeting, &patient),
        Commands::Review { meeting, patient } => commands::meeting::review(&meeting, &patient),
        Commands::Add {
            meeting,
            patient,
            note,
        } => commands::meeting::add(&meeting, &patient, &note),
        Commands::Team { action } => commands::data::run_team(action),
        Commands::Score { action } => commands::data::run_score(action),
        Commands::Event { action } => commands::data::run_event(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
