//! AssignmentDesk — one operator session over a loaded roster and incident
//! queue.
//!
//! Flow per incident:
//!   recommend → (operator picks) → assign → … → close_assignment
//!
//! RULE: Roster and incidents are read-only for the session. Live capacity
//! comes from the assignment log (open assignments), never from mutating
//! the roster.

use crate::{
    assignment::{Assignment, AssignmentRecorder, AuditStats},
    config::DeskConfig,
    error::{DeskError, DeskResult},
    explain::Explainer,
    incident::{AssignmentStatus, Incident},
    llm_client::explainer_from_config,
    matcher::{MatchOutcome, Matcher, RejectionSummary},
    recommender::{Recommendation, Recommender},
    roster::Roster,
    scorer::Scorer,
    store::DeskStore,
    types::IncidentId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;

/// Result of asking for a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecommendOutcome {
    /// Nobody passed the filters. No assignment can be recorded from this.
    NoMatch(RejectionSummary),
    Ranked(Recommendation),
}

pub struct AssignmentDesk {
    config: DeskConfig,
    roster: Roster,
    incidents: Vec<Incident>,
    status: HashMap<IncidentId, AssignmentStatus>,
    recommendations: HashMap<IncidentId, Recommendation>,
    matcher: Matcher,
    scorer: Scorer,
    recommender: Recommender,
    recorder: AssignmentRecorder,
}

impl AssignmentDesk {
    /// Open a session with the explainer the config describes.
    pub fn open(
        config: DeskConfig,
        roster: Roster,
        incidents: Vec<Incident>,
        store: DeskStore,
    ) -> DeskResult<Self> {
        let explainer = explainer_from_config(&config);
        Self::open_with_explainer(config, roster, incidents, store, explainer)
    }

    pub fn open_with_explainer(
        config: DeskConfig,
        roster: Roster,
        incidents: Vec<Incident>,
        store: DeskStore,
        explainer: Box<dyn Explainer>,
    ) -> DeskResult<Self> {
        config.validate()?;
        store.migrate()?;
        let recorder = AssignmentRecorder::new(store);

        let mut status = HashMap::new();
        let mut queue = Vec::with_capacity(incidents.len());
        for incident in incidents {
            if status.contains_key(&incident.id) {
                log::warn!("duplicate incident {} ignored", incident.id);
                continue;
            }
            let initial = if recorder.find_by_incident(&incident.id)?.is_some() {
                AssignmentStatus::Assigned
            } else {
                AssignmentStatus::Unassigned
            };
            status.insert(incident.id.clone(), initial);
            queue.push(incident);
        }

        log::info!(
            "desk open: {} staff, {} incidents ({} already assigned)",
            roster.len(),
            queue.len(),
            status
                .values()
                .filter(|s| **s == AssignmentStatus::Assigned)
                .count()
        );

        Ok(Self {
            matcher: Matcher::new(&config.scoring),
            scorer: Scorer::new(config.scoring.clone()),
            recommender: Recommender::from_config(&config, explainer),
            config,
            roster,
            incidents: queue,
            status,
            recommendations: HashMap::new(),
            recorder,
        })
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn recorder(&self) -> &AssignmentRecorder {
        &self.recorder
    }

    pub fn incident(&self, incident_id: &str) -> DeskResult<&Incident> {
        self.incidents
            .iter()
            .find(|i| i.id == incident_id)
            .ok_or_else(|| DeskError::UnknownIncident {
                id: incident_id.to_string(),
            })
    }

    pub fn status(&self, incident_id: &str) -> Option<AssignmentStatus> {
        self.status.get(incident_id).copied()
    }

    /// Incidents still waiting for an assignee, in queue order.
    pub fn unassigned_incidents(&self) -> Vec<&Incident> {
        self.incidents
            .iter()
            .filter(|i| self.status(&i.id) != Some(AssignmentStatus::Assigned))
            .collect()
    }

    /// The last recommendation made for an incident this session.
    pub fn last_recommendation(&self, incident_id: &str) -> Option<&Recommendation> {
        self.recommendations.get(incident_id)
    }

    fn refuse_if_assigned(&self, incident_id: &str) -> DeskResult<()> {
        if let Some(existing) = self.recorder.find_by_incident(incident_id)? {
            return Err(DeskError::AlreadyAssigned {
                incident_id: incident_id.to_string(),
                assignment_id: existing.assignment_id,
            });
        }
        Ok(())
    }

    pub fn recommend(&mut self, incident_id: &str) -> DeskResult<RecommendOutcome> {
        let incident = self.incident(incident_id)?.clone();
        self.refuse_if_assigned(&incident.id)?;

        let workload = self.recorder.workload()?;
        let scored = match self
            .matcher
            .find_candidates(&incident, self.roster.members(), &workload)
        {
            MatchOutcome::NoEligibleCandidates(summary) => {
                // An earlier ranking no longer applies once nobody is eligible.
                self.recommendations.remove(&incident.id);
                self.status
                    .insert(incident.id.clone(), AssignmentStatus::Unassigned);
                return Ok(RecommendOutcome::NoMatch(summary));
            }
            MatchOutcome::Eligible(candidates) => self.scorer.score_all(&incident, &candidates),
        };

        let recommendation = self.recommender.recommend(&incident, scored)?;
        self.status
            .insert(incident.id.clone(), AssignmentStatus::Recommended);
        self.recommendations
            .insert(incident.id.clone(), recommendation.clone());
        Ok(RecommendOutcome::Ranked(recommendation))
    }

    pub fn assign(&mut self, incident_id: &str, staff_id: &str) -> DeskResult<Assignment> {
        self.assign_at(incident_id, staff_id, Utc::now())
    }

    /// Record the operator's pick. Any roster member may be chosen; picking
    /// anyone but the rank-1 candidate is an override.
    pub fn assign_at(
        &mut self,
        incident_id: &str,
        staff_id: &str,
        now: DateTime<Utc>,
    ) -> DeskResult<Assignment> {
        let incident = self.incident(incident_id)?.clone();
        self.refuse_if_assigned(&incident.id)?;
        let member = self
            .roster
            .get(staff_id)
            .ok_or_else(|| DeskError::UnknownStaff {
                id: staff_id.to_string(),
            })?
            .clone();

        if !self.recommendations.contains_key(&incident.id) {
            if let RecommendOutcome::NoMatch(summary) = self.recommend(&incident.id)? {
                log::info!(
                    "incident {}: assigning {} without a recommendation ({summary})",
                    incident.id,
                    member.id
                );
            }
        }
        let recommendation = self.recommendations.get(&incident.id);

        let chosen = match recommendation.and_then(|r| r.find(&member.id)) {
            Some(ranked) => ranked.clone(),
            None => {
                let workload = self.recorder.workload()?;
                self.scorer
                    .score_member(&incident, &member, workload.effective_load(&member))
            }
        };

        let assignment = self
            .recorder
            .record(&incident, &chosen, recommendation, now)?;
        self.status
            .insert(incident.id.clone(), AssignmentStatus::Assigned);
        self.recommendations.remove(&incident.id);
        Ok(assignment)
    }

    pub fn open_assignments(&self) -> DeskResult<Vec<Assignment>> {
        self.recorder.open()
    }

    pub fn close_assignment(&self, assignment_id: &str) -> DeskResult<DateTime<Utc>> {
        self.recorder.close(assignment_id, Utc::now())
    }

    pub fn statistics(&self) -> DeskResult<AuditStats> {
        self.recorder.statistics()
    }

    /// Write the audit log to `path` as CSV. Returns the row count.
    pub fn export_csv(&self, path: &str) -> DeskResult<usize> {
        let file = File::create(path)?;
        let count = self.recorder.export_csv(BufWriter::new(file))?;
        log::info!("audit log written to {path}");
        Ok(count)
    }
}
