//! desk-runner: command-line front end for the assignment desk.
//!
//! Usage:
//!   desk-runner --roster roster.csv --incidents incidents.csv recommend INC001
//!   desk-runner --roster roster.csv --incidents incidents.csv assign INC001 U42
//!   desk-runner --roster roster.csv --incidents incidents.csv review

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use ticketdesk_core::{
    assignment::AuditStats,
    config::DeskConfig,
    desk::{AssignmentDesk, RecommendOutcome},
    incident::load_incidents,
    ingest::LoadReport,
    roster::{load_roster, Roster},
    store::DeskStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Ticket assignment desk", long_about = None)]
struct Args {
    /// JSON config file (defaults are used when omitted)
    #[arg(long, env = "DESK_CONFIG")]
    config: Option<String>,

    /// Roster CSV
    #[arg(long, env = "DESK_ROSTER", default_value = "roster.csv")]
    roster: String,

    /// Incident CSV
    #[arg(long, env = "DESK_INCIDENTS", default_value = "incidents.csv")]
    incidents: String,

    /// Assignment log database (":memory:" for a throwaway session)
    #[arg(long, env = "DESK_DB", default_value = "assignments.db")]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank candidates for an incident
    Recommend { incident: String },
    /// Assign an incident to a staff member
    Assign { incident: String, staff: String },
    /// Close an open assignment
    Close { assignment: String },
    /// Print audit statistics
    Stats,
    /// Export the audit log as CSV
    Export { path: String },
    /// List incidents still waiting for an assignee
    Pending,
    /// Interactive JSON-lines review loop on stdin/stdout
    Review,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReviewCommand {
    Recommend { incident_id: String },
    Assign { incident_id: String, staff_id: String },
    Close { assignment_id: String },
    Stats,
    Pending,
    Quit,
}

#[derive(serde::Serialize)]
struct PendingIncident<'a> {
    incident_id: &'a str,
    subcategory: &'a str,
    priority: &'a str,
    opened_at: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DeskConfig::load(path)?,
        None => DeskConfig::default(),
    };
    config.apply_env().context("applying environment overrides")?;

    let offset = config
        .default_shift_offset()
        .context("default_shift_offset_minutes out of range")?;
    let roster = load_roster(&args.roster, offset)
        .with_context(|| format!("loading roster {}", args.roster))?;
    warn_skipped("roster", &roster);
    let incidents = load_incidents(&args.incidents)
        .with_context(|| format!("loading incidents {}", args.incidents))?;
    warn_skipped("incident", &incidents);

    let store = DeskStore::open_migrated(&args.db)?;
    let mut desk = AssignmentDesk::open(
        config,
        Roster::new(roster.records),
        incidents.records,
        store,
    )?;

    match args.command {
        Command::Recommend { incident } => print_outcome(&desk.recommend(&incident)?),
        Command::Assign { incident, staff } => {
            let a = desk.assign(&incident, &staff)?;
            println!(
                "{} -> {} ({}), assignment {}",
                a.incident_id,
                a.staff_name,
                a.decision.as_str(),
                a.assignment_id
            );
        }
        Command::Close { assignment } => {
            desk.close_assignment(&assignment)?;
            println!("closed {assignment}");
        }
        Command::Stats => print_stats(&desk.statistics()?),
        Command::Export { path } => {
            let n = desk.export_csv(&path)?;
            println!("exported {n} assignments to {path}");
        }
        Command::Pending => {
            for i in desk.unassigned_incidents() {
                println!(
                    "  {:<12} {:<3} {:<20} {}",
                    i.id,
                    i.priority.as_str(),
                    i.subcategory,
                    i.opened_at.to_rfc3339()
                );
            }
        }
        Command::Review => run_review_loop(&mut desk)?,
    }

    Ok(())
}

fn warn_skipped<T>(input: &str, report: &LoadReport<T>) {
    for row in &report.skipped {
        log::warn!("{input} line {} skipped: {}", row.line, row.reason);
    }
    log::info!(
        "{input}: {} loaded, {} skipped",
        report.records.len(),
        report.skipped.len()
    );
}

fn run_review_loop(desk: &mut AssignmentDesk) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: ReviewCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, ReviewCommand::Quit) {
            break;
        }

        let response = match handle_review_command(desk, cmd) {
            Ok(v) => v,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_review_command(
    desk: &mut AssignmentDesk,
    cmd: ReviewCommand,
) -> Result<serde_json::Value> {
    let value = match cmd {
        ReviewCommand::Recommend { incident_id } => {
            serde_json::to_value(desk.recommend(&incident_id)?)?
        }
        ReviewCommand::Assign {
            incident_id,
            staff_id,
        } => serde_json::to_value(desk.assign(&incident_id, &staff_id)?)?,
        ReviewCommand::Close { assignment_id } => {
            let closed_at = desk.close_assignment(&assignment_id)?;
            serde_json::json!({ "assignment_id": assignment_id, "closed_at": closed_at })
        }
        ReviewCommand::Stats => serde_json::to_value(desk.statistics()?)?,
        ReviewCommand::Pending => {
            let pending: Vec<PendingIncident<'_>> = desk
                .unassigned_incidents()
                .into_iter()
                .map(|i| PendingIncident {
                    incident_id: &i.id,
                    subcategory: &i.subcategory,
                    priority: i.priority.as_str(),
                    opened_at: i.opened_at.to_rfc3339(),
                })
                .collect();
            serde_json::to_value(pending)?
        }
        ReviewCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn print_outcome(outcome: &RecommendOutcome) {
    let rec = match outcome {
        RecommendOutcome::NoMatch(summary) => {
            println!("{summary}");
            return;
        }
        RecommendOutcome::Ranked(rec) => rec,
    };

    println!("=== RECOMMENDATION: {} ===", rec.incident_id);
    if let Some(notice) = &rec.notice {
        println!("  note: {notice}");
    }
    for (rank, c) in rec.candidates.iter().enumerate() {
        println!(
            "  #{} {:<10} {:<20} total {:>6.1} | skill {:.1} on-call {:.1} shift {:.1} avail {:.1} | load {}/{}",
            rank + 1,
            c.staff.id,
            c.staff.name,
            c.total,
            c.breakdown.skill,
            c.breakdown.on_call,
            c.breakdown.shift,
            c.breakdown.availability,
            c.load,
            c.staff.max_concurrent
        );
        if let Some(r) = &c.rationale {
            println!("      {}", r.explanation);
        }
    }
    if let Some(analysis) = &rec.overall_analysis {
        println!();
        println!("  {analysis}");
    }
}

fn print_stats(stats: &AuditStats) {
    println!("=== AUDIT SUMMARY ===");
    println!("  total:          {}", stats.total);
    println!("  accepted top:   {}", stats.accepted);
    println!("  overridden:     {}", stats.overridden);
    println!("  acceptance:     {:.1}%", stats.acceptance_rate);
    println!("  open:           {}", stats.open);
    println!("  closed:         {}", stats.closed);
    println!("  minutes saved:  {}", stats.minutes_saved);
}
