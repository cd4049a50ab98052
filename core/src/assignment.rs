//! Assignment recorder — the append-only audit trail of operator decisions.
//!
//! RULE: An incident is assigned at most once. Records are never updated or
//! deleted; closing an assignment appends a closure row instead.
//! RULE: A storage failure while recording is returned to the caller. The
//! decision is never dropped silently.

use crate::{
    error::{DeskError, DeskResult},
    explain::Rationale,
    incident::Incident,
    matcher::Workload,
    recommender::Recommendation,
    scorer::{ScoreBreakdown, ScoredCandidate},
    store::DeskStore,
    types::{AssignmentId, IncidentId, Priority, StaffId},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Estimated operator minutes saved per decision.
const MINUTES_SAVED_ACCEPTED: u64 = 10;
const MINUTES_SAVED_OVERRIDDEN: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The operator took the rank-1 recommendation.
    AcceptedTop,
    /// The operator picked someone else.
    Overridden,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AcceptedTop => "accepted_top",
            Decision::Overridden => "overridden",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accepted_top" => Some(Decision::AcceptedTop),
            "overridden" => Some(Decision::Overridden),
            _ => None,
        }
    }

    /// AcceptedTop only when the chosen staff member is the recommendation's
    /// rank-1 candidate. No recommendation means an override.
    pub fn classify(chosen: &str, recommendation: Option<&Recommendation>) -> Self {
        match recommendation.and_then(Recommendation::top) {
            Some(top) if top.staff_id() == chosen => Decision::AcceptedTop,
            _ => Decision::Overridden,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: AssignmentId,
    pub incident_id: IncidentId,
    pub staff_id: StaffId,
    pub staff_name: String,
    pub decision: Decision,
    pub decided_at: DateTime<Utc>,
    pub priority: Priority,
    pub subcategory: String,
    /// Score of the chosen staff member at decision time.
    pub score: ScoreBreakdown,
    pub total_score: f64,
    /// What the recommender had at rank 1, if anything.
    pub top_staff_id: Option<StaffId>,
    pub top_score: Option<f64>,
    pub rationale: Option<Rationale>,
}

/// Open/closed counts, per-decision counts and the derived rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub accepted: u64,
    pub overridden: u64,
    /// Percentage of decisions that accepted the top recommendation.
    pub acceptance_rate: f64,
    pub open: u64,
    pub closed: u64,
    pub minutes_saved: u64,
}

/// Raw tallies as the store reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionCounts {
    pub accepted: u64,
    pub overridden: u64,
    pub closed: u64,
}

impl From<DecisionCounts> for AuditStats {
    fn from(c: DecisionCounts) -> Self {
        let total = c.accepted + c.overridden;
        let acceptance_rate = if total == 0 {
            0.0
        } else {
            c.accepted as f64 / total as f64 * 100.0
        };
        AuditStats {
            total,
            accepted: c.accepted,
            overridden: c.overridden,
            acceptance_rate,
            open: total.saturating_sub(c.closed),
            closed: c.closed,
            minutes_saved: c.accepted * MINUTES_SAVED_ACCEPTED
                + c.overridden * MINUTES_SAVED_OVERRIDDEN,
        }
    }
}

/// RFC 3339 UTC text used for every stored and exported timestamp.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ── CSV export ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    assignment_id: &'a str,
    incident_id: &'a str,
    staff_id: &'a str,
    staff_name: &'a str,
    decision: &'static str,
    decided_at: String,
    priority: &'static str,
    subcategory: &'a str,
    skill_score: f64,
    on_call_score: f64,
    shift_score: f64,
    availability_score: f64,
    total_score: f64,
    top_staff_id: Option<&'a str>,
    top_score: Option<f64>,
    rationale: Option<&'a str>,
}

impl<'a> From<&'a Assignment> for ExportRow<'a> {
    fn from(a: &'a Assignment) -> Self {
        ExportRow {
            assignment_id: &a.assignment_id,
            incident_id: &a.incident_id,
            staff_id: &a.staff_id,
            staff_name: &a.staff_name,
            decision: a.decision.as_str(),
            decided_at: format_timestamp(a.decided_at),
            priority: a.priority.as_str(),
            subcategory: &a.subcategory,
            skill_score: a.score.skill,
            on_call_score: a.score.on_call,
            shift_score: a.score.shift,
            availability_score: a.score.availability,
            total_score: a.total_score,
            top_staff_id: a.top_staff_id.as_deref(),
            top_score: a.top_score,
            rationale: a.rationale.as_ref().map(|r| r.explanation.as_str()),
        }
    }
}

// ── Recorder ───────────────────────────────────────────────────────

pub struct AssignmentRecorder {
    store: DeskStore,
}

impl AssignmentRecorder {
    pub fn new(store: DeskStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DeskStore {
        &self.store
    }

    /// Append one assignment for `incident`. Refuses a second assignment
    /// for the same incident.
    pub fn record(
        &self,
        incident: &Incident,
        chosen: &ScoredCandidate,
        recommendation: Option<&Recommendation>,
        now: DateTime<Utc>,
    ) -> DeskResult<Assignment> {
        if let Some(existing) = self.store.assignment_for_incident(&incident.id)? {
            return Err(DeskError::AlreadyAssigned {
                incident_id: incident.id.clone(),
                assignment_id: existing.assignment_id,
            });
        }

        let top = recommendation.and_then(Recommendation::top);
        let assignment = Assignment {
            assignment_id: format!("ASSIGN-{}", uuid::Uuid::new_v4()),
            incident_id: incident.id.clone(),
            staff_id: chosen.staff.id.clone(),
            staff_name: chosen.staff.name.clone(),
            decision: Decision::classify(chosen.staff_id(), recommendation),
            decided_at: now,
            priority: incident.priority,
            subcategory: incident.subcategory.clone(),
            score: chosen.breakdown,
            total_score: chosen.total,
            top_staff_id: top.map(|t| t.staff.id.clone()),
            top_score: top.map(|t| t.total),
            rationale: chosen.rationale.clone(),
        };

        self.store.insert_assignment(&assignment)?;
        log::info!(
            "assignment {} recorded: incident {} -> {} ({}, score {:.1})",
            assignment.assignment_id,
            assignment.incident_id,
            assignment.staff_id,
            assignment.decision.as_str(),
            assignment.total_score
        );
        Ok(assignment)
    }

    /// Mark an assignment finished. Its staff member gets the slot back.
    pub fn close(&self, assignment_id: &str, now: DateTime<Utc>) -> DeskResult<DateTime<Utc>> {
        if self.store.get_assignment(assignment_id)?.is_none() {
            return Err(DeskError::AssignmentNotFound {
                id: assignment_id.to_string(),
            });
        }
        if self.store.closure_for(assignment_id)?.is_some() {
            return Err(DeskError::AssignmentAlreadyClosed {
                id: assignment_id.to_string(),
            });
        }
        self.store.insert_closure(assignment_id, now)?;
        log::info!("assignment {assignment_id} closed");
        Ok(now)
    }

    pub fn find_by_incident(&self, incident_id: &str) -> DeskResult<Option<Assignment>> {
        self.store.assignment_for_incident(incident_id)
    }

    /// Every assignment in recording order.
    pub fn all(&self) -> DeskResult<Vec<Assignment>> {
        self.store.list_assignments()
    }

    pub fn open(&self) -> DeskResult<Vec<Assignment>> {
        self.store.list_open_assignments()
    }

    /// Open assignments per staff member, for the matcher's capacity check.
    pub fn workload(&self) -> DeskResult<Workload> {
        Ok(Workload::new(self.store.open_counts_by_staff()?))
    }

    pub fn statistics(&self) -> DeskResult<AuditStats> {
        Ok(AuditStats::from(self.store.decision_counts()?))
    }

    /// Write the full log as CSV. Returns the number of rows written.
    pub fn export_csv<W: Write>(&self, writer: W) -> DeskResult<usize> {
        let assignments = self.all()?;
        let mut wtr = csv::Writer::from_writer(writer);
        for a in &assignments {
            wtr.serialize(ExportRow::from(a))?;
        }
        if assignments.is_empty() {
            wtr.write_record(EXPORT_COLUMNS)?;
        }
        wtr.flush()?;
        log::info!("exported {} assignments", assignments.len());
        Ok(assignments.len())
    }
}

/// Column order of the CSV export.
pub const EXPORT_COLUMNS: [&str; 16] = [
    "assignment_id",
    "incident_id",
    "staff_id",
    "staff_name",
    "decision",
    "decided_at",
    "priority",
    "subcategory",
    "skill_score",
    "on_call_score",
    "shift_score",
    "availability_score",
    "total_score",
    "top_staff_id",
    "top_score",
    "rationale",
];
