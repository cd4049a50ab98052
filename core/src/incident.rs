//! Incident store: the tickets waiting for an assignee.

use crate::{
    error::DeskResult,
    ingest::{self, LoadReport, TableSpec},
    types::{IncidentId, Priority},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;

const INCIDENT_TABLE: TableSpec = TableSpec {
    input: "incident",
    required_columns: &["incident_id", "subcategory", "opened_at"],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub subcategory: String,
    pub priority: Priority,
    pub opened_at: DateTime<Utc>,
    pub short_description: Option<String>,
    pub category: Option<String>,
}

/// Where an incident is in the review flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Unassigned,
    Recommended,
    Assigned,
}

/// One incident row as it appears in the file.
#[derive(Debug, Deserialize)]
struct IncidentRow {
    incident_id: Option<String>,
    subcategory: Option<String>,
    priority: Option<String>,
    opened_at: Option<String>,
    short_description: Option<String>,
    category: Option<String>,
}

pub fn load_incidents(path: &str) -> DeskResult<LoadReport<Incident>> {
    let file = File::open(path)?;
    log::info!("loading incidents from {path}");
    read_incidents(file)
}

pub fn read_incidents(reader: impl Read) -> DeskResult<LoadReport<Incident>> {
    ingest::load_table(
        reader,
        &INCIDENT_TABLE,
        incident_from_row,
        |i: &Incident| i.id.as_str(),
    )
}

fn incident_from_row(row: IncidentRow) -> Result<Incident, String> {
    let id = ingest::required(row.incident_id, "incident_id")?;
    let subcategory = ingest::required(row.subcategory, "subcategory")?;
    let raw_opened = ingest::required(row.opened_at, "opened_at")?;
    let opened_at =
        parse_timestamp(&raw_opened).ok_or_else(|| format!("invalid opened_at '{raw_opened}'"))?;
    let priority = ingest::optional(row.priority)
        .map(|p| Priority::parse_lenient(&p))
        .unwrap_or(Priority::P3);

    Ok(Incident {
        id,
        subcategory,
        priority,
        opened_at,
        short_description: ingest::optional(row.short_description),
        category: ingest::optional(row.category),
    })
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM[:SS]` / `YYYY-MM-DDTHH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
