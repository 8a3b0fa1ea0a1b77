use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use huddle_core::{HuddlePlanner, HuddleStore, Meeting, SqliteStore};

fn planner() -> Result<HuddlePlanner, Box<dyn std::error::Error>> {
    Ok(HuddlePlanner::new(Arc::new(SqliteStore::open()?)))
}

fn print_updated(updated: Option<Meeting>, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    match updated {
        Some(meeting) => {
            println!("{}", serde_json::to_string_pretty(&meeting)?);
            Ok(())
        }
        None => Err(format!("{what} not found").into()),
    }
}

pub fn show(team: &str, date: &str) -> Result<(), Box<dyn std::error::Error>> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
    let store = SqliteStore::open()?;
    let team_id = store
        .find_team_id(team)?
        .ok_or_else(|| format!("unknown team: {team}"))?;

    match store.find_meeting(&team_id, date)? {
        Some(meeting) => println!("{}", serde_json::to_string_pretty(&meeting)?),
        None => println!("no huddle for {team} on {date}"),
    }
    Ok(())
}

pub fn cancel(meeting: &str, patient: &str) -> Result<(), Box<dyn std::error::Error>> {
    let updated = planner()?.cancel_member(meeting, patient)?;
    print_updated(updated, "meeting or member")
}

pub fn review(meeting: &str, patient: &str) -> Result<(), Box<dyn std::error::Error>> {
    let updated = planner()?.mark_reviewed(meeting, patient, Utc::now())?;
    print_updated(updated, "meeting or member")
}

pub fn add(meeting: &str, patient: &str, note: &str) -> Result<(), Box<dyn std::error::Error>> {
    let updated = planner()?.add_manual_member(meeting, patient, note)?;
    print_updated(updated, "meeting")
}
