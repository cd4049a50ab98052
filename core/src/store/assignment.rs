//! Assignment log queries. Inserts only; the schema rejects UPDATE and DELETE.

use super::DeskStore;
use crate::{
    assignment::{format_timestamp, Assignment, Decision, DecisionCounts},
    error::DeskResult,
    explain::Rationale,
    scorer::ScoreBreakdown,
    types::{Priority, StaffId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};
use std::collections::HashMap;

const ASSIGNMENT_COLUMNS: &str = "assignment_id, incident_id, staff_id, staff_name, decision,
     decided_at, priority, subcategory, skill_score, on_call_score, shift_score,
     availability_score, total_score, top_staff_id, top_score, rationale_json";

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_stored_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn assignment_from_row(r: &Row<'_>) -> rusqlite::Result<Assignment> {
    let decision: String = r.get(4)?;
    let decision = Decision::parse(&decision).ok_or_else(|| {
        conversion_error(
            4,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown decision '{decision}'"),
            ),
        )
    })?;
    let decided_at: String = r.get(5)?;
    let priority: String = r.get(6)?;
    let rationale: Option<String> = r.get(15)?;
    let rationale = rationale
        .map(|json| serde_json::from_str::<Rationale>(&json))
        .transpose()
        .map_err(|e| conversion_error(15, e))?;

    Ok(Assignment {
        assignment_id: r.get(0)?,
        incident_id: r.get(1)?,
        staff_id: r.get(2)?,
        staff_name: r.get(3)?,
        decision,
        decided_at: parse_stored_timestamp(5, &decided_at)?,
        priority: Priority::parse_lenient(&priority),
        subcategory: r.get(7)?,
        score: ScoreBreakdown {
            skill: r.get(8)?,
            on_call: r.get(9)?,
            shift: r.get(10)?,
            availability: r.get(11)?,
        },
        total_score: r.get(12)?,
        top_staff_id: r.get(13)?,
        top_score: r.get(14)?,
        rationale,
    })
}

impl DeskStore {
    pub fn insert_assignment(&self, a: &Assignment) -> DeskResult<()> {
        let rationale_json = a
            .rationale
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            &format!(
                "INSERT INTO assignment ({ASSIGNMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                a.assignment_id,
                a.incident_id,
                a.staff_id,
                a.staff_name,
                a.decision.as_str(),
                format_timestamp(a.decided_at),
                a.priority.as_str(),
                a.subcategory,
                a.score.skill,
                a.score.on_call,
                a.score.shift,
                a.score.availability,
                a.total_score,
                a.top_staff_id,
                a.top_score,
                rationale_json,
            ],
        )?;
        Ok(())
    }

    pub fn get_assignment(&self, assignment_id: &str) -> DeskResult<Option<Assignment>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignment WHERE assignment_id=?1"),
                params![assignment_id],
                assignment_from_row,
            )
            .optional()?)
    }

    pub fn assignment_for_incident(&self, incident_id: &str) -> DeskResult<Option<Assignment>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignment WHERE incident_id=?1"),
                params![incident_id],
                assignment_from_row,
            )
            .optional()?)
    }

    /// All assignments in recording order.
    pub fn list_assignments(&self) -> DeskResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignment ORDER BY seq"
        ))?;
        let rows = stmt.query_map([], assignment_from_row)?;
        let mut result = Vec::new();
        for r in rows {
            result.push(r?);
        }
        Ok(result)
    }

    /// Assignments without a closure row, in recording order.
    pub fn list_open_assignments(&self) -> DeskResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignment
             WHERE assignment_id NOT IN (SELECT assignment_id FROM assignment_closure)
             ORDER BY seq"
        ))?;
        let rows = stmt.query_map([], assignment_from_row)?;
        let mut result = Vec::new();
        for r in rows {
            result.push(r?);
        }
        Ok(result)
    }

    pub fn insert_closure(&self, assignment_id: &str, closed_at: DateTime<Utc>) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO assignment_closure (assignment_id, closed_at) VALUES (?1, ?2)",
            params![assignment_id, format_timestamp(closed_at)],
        )?;
        Ok(())
    }

    pub fn closure_for(&self, assignment_id: &str) -> DeskResult<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT closed_at FROM assignment_closure WHERE assignment_id=?1",
                params![assignment_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(raw
            .map(|s| parse_stored_timestamp(0, &s))
            .transpose()?)
    }

    /// Open assignment count per staff member. Staff with none are absent.
    pub fn open_counts_by_staff(&self) -> DeskResult<HashMap<StaffId, u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.staff_id, COUNT(*)
             FROM assignment a
             LEFT JOIN assignment_closure c ON c.assignment_id = a.assignment_id
             WHERE c.assignment_id IS NULL
             GROUP BY a.staff_id",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u32>(1)?)))?;
        let mut result = HashMap::new();
        for r in rows {
            let (staff_id, count) = r?;
            result.insert(staff_id, count);
        }
        Ok(result)
    }

    pub fn decision_counts(&self) -> DeskResult<DecisionCounts> {
        let (accepted, overridden) = self.conn.query_row(
            "SELECT
                 COALESCE(SUM(CASE WHEN decision='accepted_top' THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN decision='overridden' THEN 1 ELSE 0 END), 0)
             FROM assignment",
            [],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
        )?;
        let closed: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM assignment_closure", [], |r| r.get(0))?;
        Ok(DecisionCounts {
            accepted: accepted.max(0) as u64,
            overridden: overridden.max(0) as u64,
            closed: closed.max(0) as u64,
        })
    }
}
