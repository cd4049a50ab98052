//! Scorer — four independent, non-negative components per candidate.
//!
//!   skill         fixed points for an exact skill match (less for partial)
//!   on_call       base boost + priority-weighted bonus when on call
//!   shift         full points well inside the shift, linear decay near edges
//!   availability  scaled by free capacity / capacity
//!
//! The total is always the plain sum of the four. Scoring is pure and
//! works on any roster entry, eligible or not (override snapshots need it).

use crate::{
    config::ScoringConfig,
    explain::Rationale,
    incident::Incident,
    matcher::Candidate,
    roster::{ShiftPosition, SkillMatch, StaffMember},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub skill: f64,
    pub on_call: f64,
    pub shift: f64,
    pub availability: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.skill + self.on_call + self.shift + self.availability
    }
}

/// A staff member with their score for one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub staff: StaffMember,
    /// Effective load the score was computed at.
    pub load: u32,
    pub breakdown: ScoreBreakdown,
    pub total: f64,
    pub rationale: Option<Rationale>,
}

impl ScoredCandidate {
    pub fn staff_id(&self) -> &str {
        &self.staff.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn skill_score(&self, incident: &Incident, member: &StaffMember) -> f64 {
        match member.skill_match(&incident.subcategory) {
            SkillMatch::Exact => self.config.skill_points,
            SkillMatch::Partial if self.config.allow_partial_skill_match => {
                self.config.partial_skill_points
            }
            SkillMatch::Partial | SkillMatch::None => 0.0,
        }
    }

    pub fn on_call_score(&self, incident: &Incident, member: &StaffMember) -> f64 {
        if member.on_call {
            self.config.on_call_base + self.config.on_call_bonus(incident.priority)
        } else {
            0.0
        }
    }

    pub fn shift_score(&self, incident: &Incident, member: &StaffMember) -> f64 {
        let max = self.config.shift_max;
        match member.shift_position(incident.opened_at) {
            ShiftPosition::AllDay => max,
            ShiftPosition::Outside => 0.0,
            ShiftPosition::Inside { seconds_to_boundary } => {
                let margin_secs = f64::from(self.config.shift_margin_minutes) * 60.0;
                if margin_secs <= 0.0 {
                    max
                } else {
                    max * (f64::from(seconds_to_boundary) / margin_secs).min(1.0)
                }
            }
        }
    }

    pub fn availability_score(&self, member: &StaffMember, load: u32) -> f64 {
        if member.max_concurrent == 0 {
            return 0.0;
        }
        let ratio = f64::from(member.free_capacity(load)) / f64::from(member.max_concurrent);
        (self.config.availability_max * ratio).clamp(0.0, self.config.availability_max)
    }

    pub fn score(&self, incident: &Incident, member: &StaffMember, load: u32) -> ScoreBreakdown {
        let breakdown = ScoreBreakdown {
            skill: self.skill_score(incident, member),
            on_call: self.on_call_score(incident, member),
            shift: self.shift_score(incident, member),
            availability: self.availability_score(member, load),
        };
        log::debug!(
            "incident {} staff {}: skill={:.1} on_call={:.1} shift={:.1} availability={:.1} total={:.1}",
            incident.id,
            member.id,
            breakdown.skill,
            breakdown.on_call,
            breakdown.shift,
            breakdown.availability,
            breakdown.total()
        );
        breakdown
    }

    pub fn score_member(
        &self,
        incident: &Incident,
        member: &StaffMember,
        load: u32,
    ) -> ScoredCandidate {
        let breakdown = self.score(incident, member, load);
        ScoredCandidate {
            staff: member.clone(),
            load,
            breakdown,
            total: breakdown.total(),
            rationale: None,
        }
    }

    pub fn score_all(&self, incident: &Incident, candidates: &[Candidate<'_>]) -> Vec<ScoredCandidate> {
        candidates
            .iter()
            .map(|c| self.score_member(incident, c.staff, c.load))
            .collect()
    }
}
