//! Operational CLI for the activation engine.
//!
//! # Responsibility
//! - Provide the "re-evaluate now" trigger against a database file.
//! - Expose the transition audit trail for quick inspection.
//!
//! This binary is the only place that reads the wall clock; the engine
//! itself always receives the reference date as an argument.

use chrono::{Local, NaiveDate};
use mawsim_core::db::open_db;
use mawsim_core::{
    CategoryRepository, SeasonScheduler, SqliteCategoryRepository, TickOutcome, TickRequest,
};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

const USAGE: &str = "usage:
  mawsim tick <db_path> [YYYY-MM-DD]   force re-evaluation of all managed categories
  mawsim history <db_path> <slug>      show the transition audit trail for one category
  mawsim version                       print the core crate version";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    match args {
        [command, db_path, rest @ ..] if command == "tick" => run_tick(db_path, rest),
        [command, db_path, slug] if command == "history" => show_history(db_path, slug),
        [command] if command == "version" => {
            println!("mawsim_core version={}", mawsim_core::core_version());
            Ok(())
        }
        _ => Err(USAGE.to_string()),
    }
}

fn run_tick(db_path: &str, rest: &[String]) -> Result<(), String> {
    let as_of = match rest {
        [] => Local::now().date_naive(),
        [date] => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|err| format!("invalid date `{date}`: {err}"))?,
        _ => return Err(USAGE.to_string()),
    };

    let conn = open_db(db_path).map_err(|err| format!("failed to open `{db_path}`: {err}"))?;
    let repo = SqliteCategoryRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let scheduler = SeasonScheduler::new(repo);

    let request = TickRequest {
        as_of,
        evaluated_at_ms: epoch_ms(),
        force: true,
    };

    match scheduler.run_tick(&request).map_err(|err| err.to_string())? {
        TickOutcome::Completed(report) => {
            println!(
                "tick as_of={as_of} evaluated={} skipped={} failed={} changed={}",
                report.evaluated,
                report.skipped,
                report.failed,
                report.changed.len()
            );
            for id in &report.changed {
                println!("changed {id}");
            }
            Ok(())
        }
        TickOutcome::SkippedBusy => Err("another tick is already running".to_string()),
    }
}

fn show_history(db_path: &str, slug: &str) -> Result<(), String> {
    let conn = open_db(db_path).map_err(|err| format!("failed to open `{db_path}`: {err}"))?;
    let repo = SqliteCategoryRepository::try_new(&conn).map_err(|err| err.to_string())?;

    let category = repo
        .get_category_by_slug(slug)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("no category with slug `{slug}`"))?;

    let records = repo
        .list_transitions(category.uuid, 50)
        .map_err(|err| err.to_string())?;

    if records.is_empty() {
        println!("no transitions recorded for `{slug}`");
        return Ok(());
    }

    for record in records {
        println!(
            "{} {:?} -> {:?} evaluated_at_ms={} rule={}",
            record.id, record.from_status, record.to_status, record.evaluated_at,
            record.rule_snapshot
        );
    }
    Ok(())
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
