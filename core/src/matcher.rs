//! Matcher — filters the roster down to staff who can take an incident.
//!
//! A candidate must pass all three checks, in this order:
//!   1. skill:    the incident subcategory is one of their skills
//!   2. shift:    the incident was opened inside their shift window
//!   3. capacity: effective load < max concurrent tickets
//!
//! An empty result is a normal outcome, not an error.

use crate::{
    config::ScoringConfig,
    incident::Incident,
    roster::{ShiftPosition, SkillMatch, StaffMember},
    types::StaffId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Open assignments recorded this session, on top of the roster's own
/// `current_load` column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workload {
    open: HashMap<StaffId, u32>,
}

impl Workload {
    pub fn new(open: HashMap<StaffId, u32>) -> Self {
        Self { open }
    }

    pub fn open_for(&self, staff_id: &str) -> u32 {
        self.open.get(staff_id).copied().unwrap_or(0)
    }

    /// Roster load plus recorded open assignments.
    pub fn effective_load(&self, member: &StaffMember) -> u32 {
        member.current_load.saturating_add(self.open_for(&member.id))
    }

    pub fn has_capacity(&self, member: &StaffMember) -> bool {
        self.effective_load(member) < member.max_concurrent
    }

    /// How many roster members can take one more ticket right now.
    pub fn available_count(&self, roster: &[StaffMember]) -> usize {
        roster.iter().filter(|m| self.has_capacity(m)).count()
    }
}

/// A staff member who passed every filter, with the load they were judged at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    pub staff: &'a StaffMember,
    pub load: u32,
}

/// Why a roster entry was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingSkill,
    OffShift,
    AtCapacity,
}

/// Tally of rejections, reported to the operator when nobody matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionSummary {
    pub roster_size: usize,
    pub missing_skill: usize,
    pub off_shift: usize,
    pub at_capacity: usize,
}

impl RejectionSummary {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::MissingSkill => self.missing_skill += 1,
            Rejection::OffShift => self.off_shift += 1,
            Rejection::AtCapacity => self.at_capacity += 1,
        }
    }
}

impl fmt::Display for RejectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.roster_size == 0 {
            return f.write_str("no match: the roster is empty");
        }
        if self.at_capacity == self.roster_size {
            return f.write_str("no match: all team members are at max capacity");
        }
        write!(
            f,
            "no match among {} team members ({} lack the skill, {} off shift, {} at capacity)",
            self.roster_size, self.missing_skill, self.off_shift, self.at_capacity
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<'a> {
    Eligible(Vec<Candidate<'a>>),
    NoEligibleCandidates(RejectionSummary),
}

impl<'a> MatchOutcome<'a> {
    /// The eligible candidates, empty on no match.
    pub fn candidates(&self) -> &[Candidate<'a>] {
        match self {
            MatchOutcome::Eligible(c) => c,
            MatchOutcome::NoEligibleCandidates(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Matcher {
    allow_partial_skill_match: bool,
}

impl Matcher {
    pub fn new(scoring: &ScoringConfig) -> Self {
        Self {
            allow_partial_skill_match: scoring.allow_partial_skill_match,
        }
    }

    /// Check one roster entry. Returns the first failing filter.
    pub fn check(
        &self,
        incident: &Incident,
        member: &StaffMember,
        workload: &Workload,
    ) -> Result<u32, Rejection> {
        match member.skill_match(&incident.subcategory) {
            SkillMatch::Exact => {}
            SkillMatch::Partial if self.allow_partial_skill_match => {}
            SkillMatch::Partial | SkillMatch::None => return Err(Rejection::MissingSkill),
        }
        if member.shift_position(incident.opened_at) == ShiftPosition::Outside {
            return Err(Rejection::OffShift);
        }
        let load = workload.effective_load(member);
        if load >= member.max_concurrent {
            return Err(Rejection::AtCapacity);
        }
        Ok(load)
    }

    pub fn find_candidates<'a>(
        &self,
        incident: &Incident,
        roster: &'a [StaffMember],
        workload: &Workload,
    ) -> MatchOutcome<'a> {
        let mut summary = RejectionSummary {
            roster_size: roster.len(),
            ..RejectionSummary::default()
        };
        let mut eligible = Vec::new();

        for member in roster {
            match self.check(incident, member, workload) {
                Ok(load) => eligible.push(Candidate { staff: member, load }),
                Err(rejection) => summary.record(rejection),
            }
        }

        if eligible.is_empty() {
            log::info!("incident {}: {summary}", incident.id);
            MatchOutcome::NoEligibleCandidates(summary)
        } else {
            log::debug!(
                "incident {}: {} of {} roster entries eligible",
                incident.id,
                eligible.len(),
                roster.len()
            );
            MatchOutcome::Eligible(eligible)
        }
    }
}
