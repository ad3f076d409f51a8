// Recall Tests
// Pulling a stage back from review to an earlier point in the pipeline

mod common;

use common::{admin, artist, manager, Harness};
use showset_workflow::permissions::{Actor, Role};
use showset_workflow::showset::{Language, StageName, StageStatus};
use showset_workflow::versioning::{DeliverableType, VersionTrigger};
use showset_workflow::workflow::{ActivityKind, RecallRequest, RevisionNoteInput, WorkflowError};

fn recall(from: &str, target: &str, status: StageStatus) -> RecallRequest {
    RecallRequest {
        from: from.to_string(),
        target: target.to_string(),
        status,
        note: None,
    }
}

async fn in_review(h: &Harness, id: &str) {
    h.seed(id).await;
    h.force_statuses(
        id,
        &[
            (StageName::Screen, StageStatus::Complete),
            (StageName::Structure, StageStatus::Complete),
            (StageName::Integrated, StageStatus::EngineerReview),
            (StageName::InBim360, StageStatus::OnHold),
            (StageName::Drawing2d, StageStatus::Complete),
        ],
    )
    .await;
}

#[tokio::test]
async fn test_recall_to_upstream_stage_restarts_work() {
    let h = Harness::new();
    in_review(&h, "RC-001").await;

    let result = h
        .orchestrator
        .recall_from_review(
            &manager(),
            "RC-001",
            recall("integrated", "structure", StageStatus::InProgress),
        )
        .await
        .unwrap();

    let show_set = &result.show_set;
    assert_eq!(show_set.status_of(StageName::Structure), StageStatus::InProgress);
    assert_eq!(
        show_set.status_of(StageName::Integrated),
        StageStatus::RevisionRequired
    );
    assert_eq!(show_set.status_of(StageName::InBim360), StageStatus::OnHold);
    assert_eq!(
        show_set.status_of(StageName::Drawing2d),
        StageStatus::RevisionRequired
    );
    assert_eq!(show_set.status_of(StageName::Screen), StageStatus::Complete);

    let bump = result.bump.expect("complete -> in_progress bumps");
    assert_eq!(bump.deliverable, DeliverableType::Structure);
    assert_eq!((bump.from, bump.to), (1, 2));
    assert_eq!(
        show_set.versions.history()[0].trigger,
        VersionTrigger::Recall {
            from: StageName::Integrated,
            target: StageName::Structure
        }
    );
    assert_eq!(
        result.resets.iter().map(|r| r.stage).collect::<Vec<_>>(),
        vec![StageName::Integrated, StageName::Drawing2d]
    );

    let kinds = h.activity.kinds_for("RC-001").await;
    assert!(kinds.contains(&ActivityKind::Recalled));
    assert!(kinds.contains(&ActivityKind::VersionBumped));
}

#[tokio::test]
async fn test_recall_in_place_with_note() {
    let h = Harness::new();
    in_review(&h, "RC-002").await;

    let mut request = recall("integrated", "integrated", StageStatus::RevisionRequired);
    request.note = Some(RevisionNoteInput::new("Clash with duct run", Language::En));
    let result = h
        .orchestrator
        .recall_from_review(&manager(), "RC-002", request)
        .await
        .unwrap();

    assert!(result.bump.is_none());
    let show_set = &result.show_set;
    assert_eq!(
        show_set.status_of(StageName::Integrated),
        StageStatus::RevisionRequired
    );
    assert_eq!(show_set.status_of(StageName::Structure), StageStatus::Complete);
    let note = result.note.expect("note");
    assert_eq!(
        show_set
            .stage(StageName::Integrated)
            .and_then(|s| s.revision_note.as_ref())
            .map(|n| n.note_id),
        Some(note.id)
    );
    assert!(show_set.versions.history().is_empty());
}

#[tokio::test]
async fn test_recall_to_work_keeps_note_as_discussion() {
    let h = Harness::new();
    in_review(&h, "RC-007").await;

    let mut request = recall("integrated", "structure", StageStatus::InProgress);
    request.note = Some(RevisionNoteInput::new("Rebuild the stair core", Language::En));
    let result = h
        .orchestrator
        .recall_from_review(&manager(), "RC-007", request)
        .await
        .unwrap();

    let note = result.note.expect("note");
    let show_set = &result.show_set;
    assert!(show_set
        .stage(StageName::Structure)
        .and_then(|s| s.revision_note.as_ref())
        .is_none());
    let posted = show_set.discussion_item(note.id).expect("posted");
    assert_eq!(posted.stage, StageName::Structure);
    assert_eq!(posted.text, "Rebuild the stair core");
}

#[tokio::test]
async fn test_recall_preconditions() {
    let h = Harness::new();
    in_review(&h, "RC-003").await;
    let before = h.load("RC-003").await;

    // from must be under review
    let err = h
        .orchestrator
        .recall_from_review(
            &manager(),
            "RC-003",
            recall("structure", "screen", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    // target downstream of from
    let err = h
        .orchestrator
        .recall_from_review(
            &manager(),
            "RC-003",
            recall("integrated", "drawing2d", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    // only in_progress or revision_required
    let err = h
        .orchestrator
        .recall_from_review(
            &manager(),
            "RC-003",
            recall("integrated", "structure", StageStatus::Complete),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    // blank note
    let mut blank = recall("integrated", "structure", StageStatus::RevisionRequired);
    blank.note = Some(RevisionNoteInput::new(" ", Language::En));
    let err = h
        .orchestrator
        .recall_from_review(&manager(), "RC-003", blank)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let err = h
        .orchestrator
        .recall_from_review(
            &manager(),
            "RC-003",
            recall("integrated", "model", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidStage(_)));

    assert_eq!(h.load("RC-003").await, before);
}

#[tokio::test]
async fn test_recall_requires_target_stage_rights() {
    let h = Harness::new();
    in_review(&h, "RC-004").await;
    let coordinator = Actor::new("bim-1", "Bea Coordinator", Role::BimCoordinator);

    let err = h
        .orchestrator
        .recall_from_review(
            &coordinator,
            "RC-004",
            recall("integrated", "structure", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    h.orchestrator
        .recall_from_review(
            &coordinator,
            "RC-004",
            recall("integrated", "integrated", StageStatus::InProgress),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_recall_respects_lock_for_new_work_only() {
    let h = Harness::new();
    in_review(&h, "RC-005").await;
    h.orchestrator.lock_show_set(&admin(), "RC-005").await.unwrap();

    let err = h
        .orchestrator
        .recall_from_review(
            &artist(),
            "RC-005",
            recall("integrated", "structure", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let result = h
        .orchestrator
        .recall_from_review(
            &artist(),
            "RC-005",
            recall("integrated", "structure", StageStatus::RevisionRequired),
        )
        .await
        .unwrap();
    assert_eq!(
        result.show_set.status_of(StageName::Structure),
        StageStatus::RevisionRequired
    );
    assert!(result.show_set.lock.is_some());
}
