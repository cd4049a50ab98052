//! Explainer capability — optional natural-language justification for a
//! ranking. The recommender treats every explainer as best-effort.

use crate::{incident::Incident, scorer::ScoredCandidate, types::StaffId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Justification attached to one ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub explanation: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub primary_reason: Option<String>,
}

/// What an explainer is asked about: one incident and its ranked top-K.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationRequest<'a> {
    pub incident: &'a Incident,
    pub candidates: &'a [ScoredCandidate],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Explanation {
    pub rationales: HashMap<StaffId, Rationale>,
    pub overall_analysis: Option<String>,
}

impl Explanation {
    pub fn is_empty(&self) -> bool {
        self.rationales.is_empty() && self.overall_analysis.is_none()
    }
}

#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("LLM service is not configured")]
    NotConfigured,

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
}

/// The contract every explanation backend fulfils.
pub trait Explainer {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Produce rationale text for the request's candidates. Must not
    /// reorder or drop candidates; the caller attaches text by staff id.
    fn explain(&self, request: &ExplanationRequest<'_>) -> Result<Explanation, ExplainError>;
}

/// Explainer that never says anything. Used when no LLM is configured and
/// in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExplainer;

impl Explainer for NoopExplainer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn explain(&self, _request: &ExplanationRequest<'_>) -> Result<Explanation, ExplainError> {
        Ok(Explanation::default())
    }
}
