//! Roster store: staff members, their skills, shifts and capacity.
//!
//! Loaded once per session from a CSV file and read-only afterwards.

use crate::{
    error::DeskResult,
    ingest::{self, LoadReport, TableSpec},
    types::StaffId,
};
use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;

const SECONDS_PER_DAY: u32 = 86_400;

const ROSTER_TABLE: TableSpec = TableSpec {
    input: "roster",
    required_columns: &["user_id", "skills_csv", "max_concurrent"],
};

// ── Shift windows ────────────────────────────────────────────────────────────

/// A daily shift in a fixed timezone. `end < start` means the shift wraps
/// past midnight; `end == start` means a 24-hour shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(with = "offset_seconds")]
    pub offset: FixedOffset,
}

/// Serialise a `FixedOffset` as seconds east of UTC.
mod offset_seconds {
    use chrono::FixedOffset;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(offset: &FixedOffset, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i32(offset.local_minus_utc())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<FixedOffset, D::Error> {
        let secs = i32::deserialize(d)?;
        FixedOffset::east_opt(secs).ok_or_else(|| D::Error::custom("utc offset out of range"))
    }
}

/// Where an instant falls relative to a staff member's shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftPosition {
    /// No shift restriction (no shift defined, or a 24-hour shift).
    AllDay,
    /// Inside the window; boundaries count as inside.
    Inside { seconds_to_boundary: u32 },
    Outside,
}

impl ShiftWindow {
    pub fn new(start: NaiveTime, end: NaiveTime, offset: FixedOffset) -> Self {
        Self { start, end, offset }
    }

    pub fn position(&self, at: DateTime<Utc>) -> ShiftPosition {
        let local = at.with_timezone(&self.offset).time().num_seconds_from_midnight();
        let start = self.start.num_seconds_from_midnight();
        let end = self.end.num_seconds_from_midnight();

        let length = (end + SECONDS_PER_DAY - start) % SECONDS_PER_DAY;
        if length == 0 {
            return ShiftPosition::AllDay;
        }
        let elapsed = (local + SECONDS_PER_DAY - start) % SECONDS_PER_DAY;
        if elapsed > length {
            return ShiftPosition::Outside;
        }
        ShiftPosition::Inside {
            seconds_to_boundary: elapsed.min(length - elapsed),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.position(at) != ShiftPosition::Outside
    }
}

// ── Staff ────────────────────────────────────────────────────────────────────

/// How a staff member's skills relate to an incident subcategory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillMatch {
    Exact,
    /// A skill contains the subcategory as a substring.
    Partial,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    pub group: Option<String>,
    /// Lowercased, trimmed subcategory names.
    pub skills: BTreeSet<String>,
    pub shift: Option<ShiftWindow>,
    pub on_call: bool,
    pub current_load: u32,
    pub max_concurrent: u32,
}

impl StaffMember {
    pub fn skill_match(&self, subcategory: &str) -> SkillMatch {
        let wanted = subcategory.trim().to_lowercase();
        if wanted.is_empty() {
            return SkillMatch::None;
        }
        if self.skills.contains(&wanted) {
            SkillMatch::Exact
        } else if self.skills.iter().any(|s| s.contains(&wanted)) {
            SkillMatch::Partial
        } else {
            SkillMatch::None
        }
    }

    pub fn shift_position(&self, at: DateTime<Utc>) -> ShiftPosition {
        self.shift
            .map(|w| w.position(at))
            .unwrap_or(ShiftPosition::AllDay)
    }

    /// Free slots at the given load (never negative).
    pub fn free_capacity(&self, load: u32) -> u32 {
        self.max_concurrent.saturating_sub(load)
    }
}

/// The loaded roster, in file order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: Vec<StaffMember>,
}

impl Roster {
    pub fn new(members: Vec<StaffMember>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[StaffMember] {
        &self.members
    }

    pub fn get(&self, id: &str) -> Option<&StaffMember> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// One roster row as it appears in the file.
#[derive(Debug, Deserialize)]
struct RosterRow {
    user_id: Option<String>,
    name: Option<String>,
    group: Option<String>,
    skills_csv: Option<String>,
    shift_start: Option<String>,
    shift_end: Option<String>,
    shift_tz: Option<String>,
    on_call: Option<String>,
    max_concurrent: Option<String>,
    current_load: Option<String>,
}

pub fn load_roster(path: &str, default_offset: FixedOffset) -> DeskResult<LoadReport<StaffMember>> {
    let file = File::open(path)?;
    log::info!("loading roster from {path}");
    read_roster(file, default_offset)
}

pub fn read_roster(
    reader: impl Read,
    default_offset: FixedOffset,
) -> DeskResult<LoadReport<StaffMember>> {
    ingest::load_table(
        reader,
        &ROSTER_TABLE,
        |row: RosterRow| staff_from_row(row, default_offset),
        |m: &StaffMember| m.id.as_str(),
    )
}

fn staff_from_row(row: RosterRow, default_offset: FixedOffset) -> Result<StaffMember, String> {
    let id = ingest::required(row.user_id, "user_id")?;

    let skills: BTreeSet<String> = ingest::required(row.skills_csv, "skills_csv")?
        .split([',', ';', '|'])
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if skills.is_empty() {
        return Err("skills_csv lists no skills".into());
    }

    let max_concurrent = parse_count(&ingest::required(row.max_concurrent, "max_concurrent")?)
        .ok_or("max_concurrent is not a whole number")?;
    if max_concurrent == 0 {
        return Err("max_concurrent must be at least 1".into());
    }
    let current_load = match ingest::optional(row.current_load) {
        Some(v) => parse_count(&v).ok_or("current_load is not a whole number")?,
        None => 0,
    };

    let offset = match ingest::optional(row.shift_tz) {
        Some(tz) => parse_offset(&tz).ok_or_else(|| format!("unrecognised shift_tz '{tz}'"))?,
        None => default_offset,
    };
    let shift = match (ingest::optional(row.shift_start), ingest::optional(row.shift_end)) {
        (Some(start), Some(end)) => Some(ShiftWindow::new(
            parse_time(&start).ok_or_else(|| format!("invalid shift_start '{start}'"))?,
            parse_time(&end).ok_or_else(|| format!("invalid shift_end '{end}'"))?,
            offset,
        )),
        (None, None) => None,
        _ => return Err("shift_start and shift_end must both be set or both be blank".into()),
    };

    let name = ingest::optional(row.name).unwrap_or_else(|| format!("User_{id}"));

    Ok(StaffMember {
        id,
        name,
        group: ingest::optional(row.group),
        skills,
        shift,
        on_call: ingest::truthy(row.on_call.as_deref()),
        current_load,
        max_concurrent,
    })
}

/// Whole, non-negative number; tolerates spreadsheet exports like `5.0`.
fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    (f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&f)).then_some(f as u32)
}

pub(crate) fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Fixed UTC offset from `UTC`, `Z`, `IST`, `Asia/Kolkata`, `+05:30`, `-0400` or `+5`.
pub(crate) fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    match raw.to_ascii_uppercase().as_str() {
        "UTC" | "Z" | "GMT" => return FixedOffset::east_opt(0),
        "IST" | "ASIA/KOLKATA" | "ASIA/CALCUTTA" => return FixedOffset::east_opt(330 * 60),
        _ => {}
    }
    if !raw.is_ascii() {
        return None;
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if rest.len() == 4 => (rest[..2].parse().ok()?, rest[2..].parse().ok()?),
        None => (rest.parse().ok()?, 0),
    };
    if !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
