//! Tabular (CSV) ingestion shared by the roster and incident loaders.
//!
//! RULE: a bad row never fails the load. It is skipped, logged, and
//! reported back in the `LoadReport`. Only an unreadable file or a
//! missing required column is fatal.

use crate::error::{DeskError, DeskResult};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::io::Read;

/// A row that was quarantined during a load.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    /// 1-based line number in the source file (the header is line 1).
    pub line: u64,
    pub reason: String,
}

/// Result of loading a tabular file: the valid records plus everything skipped.
#[derive(Debug, Clone)]
pub struct LoadReport<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRow>,
}

impl<T> LoadReport<T> {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Describes one kind of tabular input.
pub(crate) struct TableSpec {
    /// Human name used in logs and errors ("roster", "incident").
    pub input: &'static str,
    pub required_columns: &'static [&'static str],
}

/// Read every row of `reader` as `R`, convert it with `validate`, and drop
/// rows whose id (per `id_of`) was already seen.
pub(crate) fn load_table<R, T, V, K>(
    reader: impl Read,
    spec: &TableSpec,
    mut validate: V,
    id_of: K,
) -> DeskResult<LoadReport<T>>
where
    R: DeserializeOwned,
    V: FnMut(R) -> Result<T, String>,
    K: Fn(&T) -> &str,
{
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: StringRecord = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    for &column in spec.required_columns {
        if !headers.iter().any(|h| h == column) {
            return Err(DeskError::MissingColumn {
                input: spec.input,
                column,
            });
        }
    }
    rdr.set_headers(headers.clone());

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (idx, result) in rdr.records().enumerate() {
        // Header is line 1, so the n-th data row sits on line n + 2.
        let fallback_line = idx as u64 + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                quarantine(&mut skipped, spec.input, fallback_line, e.to_string());
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

        let parsed = if record.iter().all(str::is_empty) {
            Err("blank row".to_string())
        } else {
            record
                .deserialize::<R>(Some(&headers))
                .map_err(|e| e.to_string())
                .and_then(&mut validate)
        };

        match parsed {
            Ok(rec) => {
                let id = id_of(&rec).to_string();
                if seen.insert(id.clone()) {
                    records.push(rec);
                } else {
                    quarantine(&mut skipped, spec.input, line, format!("duplicate id '{id}'"));
                }
            }
            Err(reason) => quarantine(&mut skipped, spec.input, line, reason),
        }
    }

    log::info!(
        "loaded {} {} records ({} skipped)",
        records.len(),
        spec.input,
        skipped.len()
    );
    Ok(LoadReport { records, skipped })
}

fn quarantine(skipped: &mut Vec<SkippedRow>, input: &str, line: u64, reason: String) {
    log::warn!("{input} line {line}: skipped, {reason}");
    skipped.push(SkippedRow { line, reason });
}

/// Return the trimmed value of a required cell or an error naming it.
pub(crate) fn required(value: Option<String>, column: &str) -> Result<String, String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(format!("missing required field '{column}'")),
    }
}

/// Trimmed value of an optional cell; blank cells become `None`.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Spreadsheet-style truthy cell: yes / true / 1 / y.
pub(crate) fn truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "yes" | "true" | "1" | "y"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_accepts_spreadsheet_spellings() {
        for v in ["Yes", "TRUE", "1", "y"] {
            assert!(truthy(Some(v)), "{v} should be truthy");
        }
        for v in ["no", "0", "", "false"] {
            assert!(!truthy(Some(v)), "{v} should be falsy");
        }
        assert!(!truthy(None));
    }

    #[test]
    fn required_rejects_blank_cells() {
        assert!(required(Some("  ".into()), "user_id").is_err());
        assert!(required(None, "user_id").is_err());
        assert_eq!(required(Some(" u1 ".into()), "user_id").unwrap(), "u1");
    }
}
