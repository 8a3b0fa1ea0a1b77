use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;
use huddle_core::{EventRecord, ScoreRecord, SqliteStore};

#[derive(Subcommand)]
pub enum TeamAction {
    /// Register a team
    Create {
        /// Team name, as used in the configuration
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ScoreAction {
    /// Record the current risk score of a patient
    Set {
        patient: String,
        value: f64,
        /// Assessment method code
        #[arg(long, default_value = "risk")]
        method: String,
        /// Last huddle the patient was discussed at (YYYY-MM-DD)
        #[arg(long)]
        last_meeting: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum EventAction {
    /// Record a coded clinical event
    Add {
        patient: String,
        /// Comma-separated event codes
        #[arg(long, value_delimiter = ',', required = true)]
        codes: Vec<String>,
        /// Start timestamp (RFC 3339)
        #[arg(long)]
        start: String,
        /// End timestamp (RFC 3339)
        #[arg(long)]
        end: Option<String>,
    },
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub fn run_team(action: TeamAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open()?;
    match action {
        TeamAction::Create { name } => {
            let id = store.create_team(&name)?;
            println!("Team created: {name} ({id})");
        }
    }
    Ok(())
}

pub fn run_score(action: ScoreAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open()?;
    match action {
        ScoreAction::Set {
            patient,
            value,
            method,
            last_meeting,
        } => {
            let last_meeting = last_meeting
                .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
                .transpose()?;
            let record = ScoreRecord {
                patient_id: patient,
                score: value,
                assessed_at: Utc::now(),
                last_meeting,
            };
            store.put_score(&method, &record)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(())
}

pub fn run_event(action: EventAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open()?;
    match action {
        EventAction::Add {
            patient,
            codes,
            start,
            end,
        } => {
            let event = EventRecord {
                patient_id: patient,
                codes: codes.into_iter().map(|c| c.trim().to_string()).collect(),
                start: parse_timestamp(&start)?,
                end: end.as_deref().map(parse_timestamp).transpose()?,
            };
            let id = store.put_event(&event)?;
            println!("Event recorded: {id}");
        }
    }
    Ok(())
}
