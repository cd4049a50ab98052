//! Shared primitive types used across the desk.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Roster identifier for a staff member.
pub type StaffId = String;

/// Identifier of an incident (ticket).
pub type IncidentId = String;

/// Identifier generated for each recorded assignment.
pub type AssignmentId = String;

/// Incident priority. P1 is the most urgent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
}

impl Priority {
    /// Parse a priority cell. Accepts `P1`..`P4` in any case and the numeric
    /// codes `1`..`4`, optionally as `1.0` or followed by a label
    /// (`1 - Critical`). Anything else falls back to P3.
    pub fn parse_lenient(raw: &str) -> Self {
        let raw = raw.trim();
        let code = raw
            .strip_prefix('P')
            .or_else(|| raw.strip_prefix('p'))
            .unwrap_or(raw);
        let digits_end = code
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(code.len());
        let (digits, mut rest) = code.split_at(digits_end);
        if let Some(fraction) = rest.strip_prefix('.') {
            rest = fraction.trim_start_matches('0');
        }
        if !(rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '-')) {
            return Priority::P3;
        }
        match digits {
            "1" => Priority::P1,
            "2" => Priority::P2,
            "3" => Priority::P3,
            "4" => Priority::P4,
            _ => Priority::P3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
            Priority::P4 => "P4",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
