//! End-to-end desk sessions: recommend, assign, override, close, export.

use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use serde_json::json;
use std::collections::BTreeSet;
use ticketdesk_core::{
    assignment::Decision,
    config::DeskConfig,
    desk::{AssignmentDesk, RecommendOutcome},
    error::DeskError,
    explain::NoopExplainer,
    incident::{AssignmentStatus, Incident},
    recommender::{Recommendation, RecommendationMethod},
    roster::{Roster, StaffMember},
    store::DeskStore,
    types::Priority,
};

fn incident(id: &str, subcategory: &str, priority: Priority) -> Incident {
    Incident {
        id: id.into(),
        subcategory: subcategory.into(),
        priority,
        opened_at: Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap(),
        short_description: Some(format!("{subcategory} problem")),
        category: None,
    }
}

fn staff(id: &str, skills: &[&str], on_call: bool, load: u32, max: u32) -> StaffMember {
    StaffMember {
        id: id.into(),
        name: format!("Staff {id}"),
        group: None,
        skills: skills.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        shift: None,
        on_call,
        current_load: load,
        max_concurrent: max,
    }
}

fn roster() -> Roster {
    Roster::new(vec![
        staff("A", &["network"], true, 2, 3),
        staff("B", &["network"], false, 0, 5),
        staff("C", &["database"], false, 0, 5),
    ])
}

fn incidents() -> Vec<Incident> {
    vec![
        incident("INC1", "network", Priority::P1),
        incident("INC2", "network", Priority::P3),
        incident("INC3", "email", Priority::P2),
        incident("INC4", "database", Priority::P4),
    ]
}

fn memory_store() -> DeskStore {
    DeskStore::in_memory().unwrap()
}

fn desk_with(store: DeskStore) -> AssignmentDesk {
    AssignmentDesk::open_with_explainer(
        DeskConfig::default_test(),
        roster(),
        incidents(),
        store,
        Box::new(NoopExplainer),
    )
    .unwrap()
}

fn ranked(outcome: RecommendOutcome) -> Recommendation {
    match outcome {
        RecommendOutcome::Ranked(rec) => rec,
        other => panic!("expected a ranking, got {other:?}"),
    }
}

/// Recommend then accept the top pick.
#[test]
fn accept_top_recommendation() {
    let mut desk = desk_with(memory_store());
    assert_eq!(desk.status("INC1"), Some(AssignmentStatus::Unassigned));

    let rec = ranked(desk.recommend("INC1").unwrap());
    assert_eq!(rec.candidates.len(), 2);
    assert_eq!(rec.top().unwrap().staff_id(), "A");
    assert_eq!(desk.status("INC1"), Some(AssignmentStatus::Recommended));

    let a = desk.assign("INC1", "A").unwrap();
    assert_eq!(a.decision, Decision::AcceptedTop);
    assert_eq!(desk.status("INC1"), Some(AssignmentStatus::Assigned));

    let pending: Vec<&str> = desk
        .unassigned_incidents()
        .iter()
        .map(|i| i.id.as_str())
        .collect();
    assert_eq!(pending, vec!["INC2", "INC3", "INC4"]);
}

/// Assigned incidents cannot be recommended or assigned again.
#[test]
fn assigned_incident_is_locked() {
    let mut desk = desk_with(memory_store());
    desk.assign("INC1", "A").unwrap();

    assert!(matches!(
        desk.recommend("INC1"),
        Err(DeskError::AlreadyAssigned { .. })
    ));
    assert!(matches!(
        desk.assign("INC1", "B"),
        Err(DeskError::AlreadyAssigned { .. })
    ));
    assert_eq!(desk.statistics().unwrap().total, 1);
}

/// Picking a lower-ranked or unmatched staff member is an override.
#[test]
fn override_records_chosen_score() {
    let mut desk = desk_with(memory_store());
    let rec = ranked(desk.recommend("INC2").unwrap());
    let b_total = rec.find("B").unwrap().total;

    let a = desk.assign("INC2", "B").unwrap();
    assert_eq!(a.decision, Decision::Overridden);
    assert_eq!(a.top_staff_id.as_deref(), Some("A"));
    assert!((a.total_score - b_total).abs() < 1e-9);

    // C lacks the skill but may still be picked by the operator.
    desk.recommend("INC1").unwrap();
    let c = desk.assign("INC1", "C").unwrap();
    assert_eq!(c.decision, Decision::Overridden);
    assert_eq!(c.score.skill, 0.0);
}

/// No eligible staff gives NoMatch and leaves the incident unassigned.
#[test]
fn no_match_creates_nothing() {
    let mut desk = desk_with(memory_store());
    match desk.recommend("INC3").unwrap() {
        RecommendOutcome::NoMatch(summary) => {
            assert_eq!(summary.roster_size, 3);
            assert_eq!(summary.missing_skill, 3);
        }
        other => panic!("expected no match, got {other:?}"),
    }
    assert_eq!(desk.status("INC3"), Some(AssignmentStatus::Unassigned));
    assert_eq!(desk.statistics().unwrap().total, 0);
}

/// A ranking made before capacity ran out does not survive a later NoMatch.
#[test]
fn no_match_discards_earlier_ranking() {
    let mut desk = AssignmentDesk::open_with_explainer(
        DeskConfig::default_test(),
        Roster::new(vec![staff("A", &["network"], true, 0, 1)]),
        incidents(),
        memory_store(),
        Box::new(NoopExplainer),
    )
    .unwrap();

    let rec = ranked(desk.recommend("INC1").unwrap());
    assert_eq!(rec.top().unwrap().staff_id(), "A");
    desk.assign("INC2", "A").unwrap();

    match desk.recommend("INC1").unwrap() {
        RecommendOutcome::NoMatch(summary) => assert_eq!(summary.at_capacity, 1),
        other => panic!("expected no match, got {other:?}"),
    }
    assert_eq!(desk.status("INC1"), Some(AssignmentStatus::Unassigned));
    assert!(desk.last_recommendation("INC1").is_none());

    let a = desk.assign("INC1", "A").unwrap();
    assert_eq!(a.decision, Decision::Overridden);
    assert!(a.top_staff_id.is_none());
}

/// Unknown ids are reported as such.
#[test]
fn unknown_ids_are_errors() {
    let mut desk = desk_with(memory_store());
    assert!(matches!(
        desk.recommend("NOPE"),
        Err(DeskError::UnknownIncident { .. })
    ));
    assert!(matches!(
        desk.assign("INC1", "Z"),
        Err(DeskError::UnknownStaff { .. })
    ));
    assert!(matches!(
        desk.close_assignment("ASSIGN-nope"),
        Err(DeskError::AssignmentNotFound { .. })
    ));
}

/// Assigning without a prior recommendation computes one first.
#[test]
fn assign_without_recommendation_ranks_first() {
    let mut desk = desk_with(memory_store());
    let a = desk.assign("INC4", "C").unwrap();
    assert_eq!(a.decision, Decision::AcceptedTop);
    assert_eq!(a.top_staff_id.as_deref(), Some("C"));
}

/// A's last slot is taken by an assignment and returned on close.
#[test]
fn closing_an_assignment_restores_eligibility() {
    let mut desk = desk_with(memory_store());
    let first = desk.assign("INC1", "A").unwrap();

    let rec = ranked(desk.recommend("INC2").unwrap());
    assert!(rec.find("A").is_none(), "A is at capacity");

    desk.close_assignment(&first.assignment_id).unwrap();
    assert!(desk.open_assignments().unwrap().is_empty());

    let rec = ranked(desk.recommend("INC2").unwrap());
    assert_eq!(rec.top().unwrap().staff_id(), "A");
}

/// Reopening the same database restores assigned state; export matches.
#[test]
fn session_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("desk.db");
    let db = db.to_str().unwrap();

    let recorded = {
        let mut desk = desk_with(DeskStore::open_migrated(db).unwrap());
        vec![
            desk.assign("INC1", "A").unwrap(),
            desk.assign("INC2", "A").unwrap(),
        ]
    };

    let desk = desk_with(DeskStore::open_migrated(db).unwrap());
    assert_eq!(desk.status("INC1"), Some(AssignmentStatus::Assigned));
    assert_eq!(desk.status("INC2"), Some(AssignmentStatus::Assigned));
    assert_eq!(desk.unassigned_incidents().len(), 2);

    let export = dir.path().join("audit.csv");
    let export = export.to_str().unwrap();
    assert_eq!(desk.export_csv(export).unwrap(), 2);

    let mut rdr = csv::Reader::from_path(export).unwrap();
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), recorded.len());
    for (row, a) in rows.iter().zip(&recorded) {
        assert_eq!(&row[0], a.assignment_id.as_str());
        assert_eq!(&row[4], a.decision.as_str());
    }

    let stats = desk.statistics().unwrap();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.overridden, 1);
}

/// A configured LLM annotates the ranking end to end.
#[test]
fn llm_rationale_reaches_the_assignment() {
    let mut server = Server::new();
    let content = json!({
        "top1": { "user_id": "A", "primary_reason": "on_call", "reasons": ["On call"],
                  "explanation": "A is on call for this P1." },
        "top2": { "user_id": "B", "explanation": "B has spare capacity." },
        "overall_analysis": "Critical network outage."
    });
    let _mock = server
        .mock("POST", "/openai/deployments/test-model/chat/completions")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({ "choices": [{ "message": { "content": content.to_string() } }] }).to_string(),
        )
        .create();

    let mut config = DeskConfig::default_test();
    config.llm.endpoint = Some(server.url());
    config.llm.api_key = Some("test-key".into());
    config.llm.model = "test-model".into();

    let mut desk = AssignmentDesk::open(config, roster(), incidents(), memory_store()).unwrap();
    let rec = ranked(desk.recommend("INC1").unwrap());
    assert_eq!(rec.method, RecommendationMethod::LlmReasoning);
    assert_eq!(rec.overall_analysis.as_deref(), Some("Critical network outage."));

    let a = desk.assign("INC1", "A").unwrap();
    assert_eq!(
        a.rationale.unwrap().explanation,
        "A is on call for this P1."
    );
}
