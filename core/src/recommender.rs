//! Recommender — ranks scored candidates and asks the explainer for
//! rationale text.
//!
//! Ranking order (fixed, fully deterministic):
//!   1. total score, descending
//!   2. on-call before off-call
//!   3. lower effective load
//!   4. staff id, ascending
//!
//! The explainer only annotates. Its failure never changes the order.

use crate::{
    config::DeskConfig,
    error::{DeskError, DeskResult},
    explain::{ExplanationRequest, Explainer},
    incident::Incident,
    scorer::ScoredCandidate,
    types::IncidentId,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMethod {
    LlmReasoning,
    ScoreOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub incident_id: IncidentId,
    /// Ranked best-first, at most top-K long.
    pub candidates: Vec<ScoredCandidate>,
    pub method: RecommendationMethod,
    pub overall_analysis: Option<String>,
    /// Informational notice for the operator (e.g. LLM fallback).
    pub notice: Option<String>,
}

impl Recommendation {
    pub fn top(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }

    pub fn find(&self, staff_id: &str) -> Option<&ScoredCandidate> {
        self.candidates.iter().find(|c| c.staff.id == staff_id)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Total order used for ranking.
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.total
        .total_cmp(&a.total)
        .then_with(|| b.staff.on_call.cmp(&a.staff.on_call))
        .then_with(|| a.load.cmp(&b.load))
        .then_with(|| a.staff.id.cmp(&b.staff.id))
}

/// Sort candidates best-first.
pub fn rank(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    candidates.sort_by(rank_order);
    candidates
}

pub struct Recommender {
    explainer: Box<dyn Explainer>,
    top_k: usize,
    fallback_enabled: bool,
}

impl Recommender {
    pub fn new(explainer: Box<dyn Explainer>, top_k: usize, fallback_enabled: bool) -> Self {
        Self {
            explainer,
            top_k: top_k.max(1),
            fallback_enabled,
        }
    }

    pub fn from_config(config: &DeskConfig, explainer: Box<dyn Explainer>) -> Self {
        Self::new(explainer, config.top_k, config.fallback_enabled)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn recommend(
        &self,
        incident: &Incident,
        candidates: Vec<ScoredCandidate>,
    ) -> DeskResult<Recommendation> {
        let mut ranked = rank(candidates);
        ranked.truncate(self.top_k);

        let mut recommendation = Recommendation {
            incident_id: incident.id.clone(),
            candidates: ranked,
            method: RecommendationMethod::ScoreOnly,
            overall_analysis: None,
            notice: None,
        };
        if recommendation.is_empty() {
            return Ok(recommendation);
        }

        let request = ExplanationRequest {
            incident,
            candidates: &recommendation.candidates,
        };
        match self.explainer.explain(&request) {
            Ok(mut explanation) => {
                recommendation.overall_analysis = explanation.overall_analysis.take();
                let mut annotated = 0;
                for candidate in &mut recommendation.candidates {
                    if let Some(rationale) = explanation.rationales.remove(&candidate.staff.id) {
                        candidate.rationale = Some(rationale);
                        annotated += 1;
                    }
                }
                if annotated > 0 {
                    recommendation.method = RecommendationMethod::LlmReasoning;
                }
                log::info!(
                    "incident {}: {} candidates ranked, {annotated} explained by {}",
                    incident.id,
                    recommendation.candidates.len(),
                    self.explainer.name()
                );
            }
            Err(e) if self.fallback_enabled => {
                log::warn!(
                    "incident {}: {} explainer failed, falling back to score-only ranking: {e}",
                    incident.id,
                    self.explainer.name()
                );
                recommendation.notice = Some(format!(
                    "AI explanation unavailable ({e}); showing score-based ranking"
                ));
            }
            Err(e) => return Err(DeskError::Explain(e)),
        }

        Ok(recommendation)
    }
}
