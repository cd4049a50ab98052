use crate::explain::ExplainError;
use crate::types::{AssignmentId, IncidentId, StaffId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("LLM explanation failed: {0}")]
    Explain(#[from] ExplainError),

    #[error("{input} input is missing required column '{column}'")]
    MissingColumn {
        input: &'static str,
        column: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Incident '{id}' not found")]
    UnknownIncident { id: IncidentId },

    #[error("Staff member '{id}' not found in roster")]
    UnknownStaff { id: StaffId },

    #[error("Incident '{incident_id}' is already assigned ({assignment_id})")]
    AlreadyAssigned {
        incident_id: IncidentId,
        assignment_id: AssignmentId,
    },

    #[error("Assignment '{id}' not found")]
    AssignmentNotFound { id: AssignmentId },

    #[error("Assignment '{id}' is already closed")]
    AssignmentAlreadyClosed { id: AssignmentId },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DeskResult<T> = Result<T, DeskError>;
