//! Append-only assignment log: recording, closure, export, statistics.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use ticketdesk_core::{
    assignment::{AssignmentRecorder, Decision, EXPORT_COLUMNS},
    error::DeskError,
    explain::{NoopExplainer, Rationale},
    incident::Incident,
    recommender::{Recommendation, Recommender},
    roster::StaffMember,
    scorer::{ScoredCandidate, Scorer},
    store::DeskStore,
    types::Priority,
};

fn recorder() -> AssignmentRecorder {
    let store = DeskStore::in_memory().unwrap();
    store.migrate().unwrap();
    AssignmentRecorder::new(store)
}

fn now(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 11, minute, 7).unwrap()
        + chrono::Duration::milliseconds(250)
}

fn incident(id: &str) -> Incident {
    Incident {
        id: id.into(),
        subcategory: "network".into(),
        priority: Priority::P2,
        opened_at: Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap(),
        short_description: None,
        category: None,
    }
}

fn staff(id: &str, on_call: bool) -> StaffMember {
    StaffMember {
        id: id.into(),
        name: format!("Staff {id}"),
        group: None,
        skills: BTreeSet::from(["network".to_string()]),
        shift: None,
        on_call,
        current_load: 0,
        max_concurrent: 5,
    }
}

fn recommendation(inc: &Incident) -> Recommendation {
    let scorer = Scorer::default();
    let candidates: Vec<ScoredCandidate> = [staff("A", true), staff("B", false)]
        .iter()
        .map(|m| scorer.score_member(inc, m, 0))
        .collect();
    Recommender::new(Box::new(NoopExplainer), 3, true)
        .recommend(inc, candidates)
        .unwrap()
}

#[derive(Debug, serde::Deserialize)]
struct ExportedRow {
    assignment_id: String,
    incident_id: String,
    staff_id: String,
    decision: String,
    decided_at: String,
    total_score: f64,
    top_staff_id: Option<String>,
    rationale: Option<String>,
}

/// Taking rank 1 is AcceptedTop; anyone else is Overridden.
#[test]
fn decision_type_follows_the_top_pick() {
    let rec = recorder();

    let inc1 = incident("INC1");
    let r1 = recommendation(&inc1);
    let top = r1.top().unwrap().clone();
    let a1 = rec.record(&inc1, &top, Some(&r1), now(1)).unwrap();
    assert_eq!(a1.decision, Decision::AcceptedTop);
    assert_eq!(a1.top_staff_id.as_deref(), Some("A"));
    assert!(a1.assignment_id.starts_with("ASSIGN-"));

    let inc2 = incident("INC2");
    let r2 = recommendation(&inc2);
    let second = r2.find("B").unwrap().clone();
    let a2 = rec.record(&inc2, &second, Some(&r2), now(2)).unwrap();
    assert_eq!(a2.decision, Decision::Overridden);
    assert_eq!(a2.staff_id, "B");
    assert_eq!(a2.top_score, Some(r2.top().unwrap().total));

    let inc3 = incident("INC3");
    let manual = Scorer::default().score_member(&inc3, &staff("A", true), 0);
    let a3 = rec.record(&inc3, &manual, None, now(3)).unwrap();
    assert_eq!(a3.decision, Decision::Overridden);
    assert!(a3.top_staff_id.is_none());
}

/// A second assignment for the same incident is refused.
#[test]
fn duplicate_assignment_is_refused() {
    let rec = recorder();
    let inc = incident("INC1");
    let r = recommendation(&inc);
    let first = rec
        .record(&inc, r.top().unwrap(), Some(&r), now(1))
        .unwrap();

    let err = rec
        .record(&inc, r.find("B").unwrap(), Some(&r), now(2))
        .unwrap_err();
    match err {
        DeskError::AlreadyAssigned {
            incident_id,
            assignment_id,
        } => {
            assert_eq!(incident_id, "INC1");
            assert_eq!(assignment_id, first.assignment_id);
        }
        other => panic!("expected AlreadyAssigned, got {other:?}"),
    }
    assert_eq!(rec.all().unwrap().len(), 1);
}

/// Storage rejects UPDATE and DELETE on recorded assignments.
#[test]
fn storage_rejects_update_and_delete() {
    let rec = recorder();
    let inc = incident("INC1");
    let r = recommendation(&inc);
    let a = rec.record(&inc, r.top().unwrap(), Some(&r), now(1)).unwrap();

    let conn = rec.store().connection();
    assert!(conn
        .execute(
            "UPDATE assignment SET staff_id='B' WHERE assignment_id=?1",
            [&a.assignment_id],
        )
        .is_err());
    assert!(conn
        .execute("DELETE FROM assignment WHERE assignment_id=?1", [&a.assignment_id])
        .is_err());

    rec.close(&a.assignment_id, now(5)).unwrap();
    assert!(conn
        .execute("DELETE FROM assignment_closure", [])
        .is_err());

    let stored = rec.find_by_incident("INC1").unwrap().unwrap();
    assert_eq!(stored, a);
}

/// A failed write is returned to the caller, never swallowed.
#[test]
fn storage_failure_is_surfaced() {
    let rec = recorder();
    rec.store()
        .connection()
        .execute_batch("ALTER TABLE assignment RENAME TO assignment_archive;")
        .unwrap();

    let inc = incident("INC1");
    let r = recommendation(&inc);
    let err = rec
        .record(&inc, r.top().unwrap(), Some(&r), now(1))
        .unwrap_err();
    assert!(matches!(err, DeskError::Database(_)), "{err:?}");
}

/// Closing frees capacity; unknown and repeated closes are errors.
#[test]
fn closing_frees_capacity() {
    let rec = recorder();
    let inc1 = incident("INC1");
    let inc2 = incident("INC2");
    let r1 = recommendation(&inc1);
    let r2 = recommendation(&inc2);
    let a1 = rec.record(&inc1, r1.top().unwrap(), Some(&r1), now(1)).unwrap();
    rec.record(&inc2, r2.top().unwrap(), Some(&r2), now(2)).unwrap();

    assert_eq!(rec.workload().unwrap().open_for("A"), 2);
    rec.close(&a1.assignment_id, now(10)).unwrap();
    assert_eq!(rec.workload().unwrap().open_for("A"), 1);
    assert_eq!(rec.open().unwrap().len(), 1);

    assert!(matches!(
        rec.close(&a1.assignment_id, now(11)),
        Err(DeskError::AssignmentAlreadyClosed { .. })
    ));
    assert!(matches!(
        rec.close("ASSIGN-missing", now(11)),
        Err(DeskError::AssignmentNotFound { .. })
    ));
}

/// Every assignment is exported exactly once with its decision and timestamp.
#[test]
fn export_contains_each_assignment_once() {
    let rec = recorder();
    let mut recorded = Vec::new();
    for (i, pick) in ["A", "B", "A"].iter().enumerate() {
        let inc = incident(&format!("INC{i}"));
        let r = recommendation(&inc);
        let mut chosen = r.find(pick).unwrap().clone();
        chosen.rationale = Some(Rationale {
            explanation: format!("picked {pick}, with a comma"),
            reasons: vec![],
            primary_reason: None,
        });
        recorded.push(rec.record(&inc, &chosen, Some(&r), now(i as u32)).unwrap());
    }

    let mut buf = Vec::new();
    assert_eq!(rec.export_csv(&mut buf).unwrap(), 3);

    let mut rdr = csv::Reader::from_reader(buf.as_slice());
    let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, EXPORT_COLUMNS);
    let rows: Vec<ExportedRow> = rdr.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), recorded.len());

    for a in &recorded {
        let matching: Vec<&ExportedRow> = rows
            .iter()
            .filter(|r| r.assignment_id == a.assignment_id)
            .collect();
        assert_eq!(matching.len(), 1, "{} exported once", a.assignment_id);
        let row = matching[0];
        assert_eq!(row.incident_id, a.incident_id);
        assert_eq!(row.staff_id, a.staff_id);
        assert_eq!(row.decision, a.decision.as_str());
        let exported_at = DateTime::parse_from_rfc3339(&row.decided_at)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(exported_at, a.decided_at);
        assert!((row.total_score - a.total_score).abs() < 1e-9);
        assert_eq!(row.top_staff_id.as_deref(), Some("A"));
        assert!(row.rationale.as_deref().unwrap().contains("with a comma"));
    }
    assert_eq!(rows[1].decision, "overridden");
}

/// An empty log still exports a header row.
#[test]
fn empty_export_has_header_only() {
    let rec = recorder();
    let mut buf = Vec::new();
    assert_eq!(rec.export_csv(&mut buf).unwrap(), 0);
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.trim_end(), EXPORT_COLUMNS.join(","));
}

/// Statistics count decisions, open/closed and minutes saved.
#[test]
fn statistics_summarise_the_log() {
    let rec = recorder();
    let mut ids = Vec::new();
    for (i, pick) in ["A", "A", "B"].iter().enumerate() {
        let inc = incident(&format!("INC{i}"));
        let r = recommendation(&inc);
        let a = rec
            .record(&inc, r.find(pick).unwrap(), Some(&r), now(i as u32))
            .unwrap();
        ids.push(a.assignment_id);
    }
    rec.close(&ids[0], now(30)).unwrap();

    let stats = rec.statistics().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.overridden, 1);
    assert_eq!(stats.open, 2);
    assert_eq!(stats.closed, 1);
    assert_eq!(stats.minutes_saved, 25);
    assert!((stats.acceptance_rate - 200.0 / 3.0).abs() < 1e-9);
}

/// The log survives reopening the database file.
#[test]
fn log_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assignments.db");
    let path = path.to_str().unwrap();

    let inc = incident("INC1");
    let r = recommendation(&inc);
    let recorded = {
        let rec = AssignmentRecorder::new(DeskStore::open_migrated(path).unwrap());
        rec.record(&inc, r.top().unwrap(), Some(&r), now(1)).unwrap()
    };

    let rec = AssignmentRecorder::new(DeskStore::open_migrated(path).unwrap());
    let all = rec.all().unwrap();
    assert_eq!(all, vec![recorded]);
}
