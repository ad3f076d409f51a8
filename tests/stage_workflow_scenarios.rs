// Stage Workflow Scenarios
// End-to-end transitions through the orchestrator against the in-memory store

mod common;

use std::sync::Arc;

use common::{admin, artist, engineer, manager, viewer, Harness, HarnessBuilder, YieldingStore};
use showset_workflow::showset::{FieldUpdate, Language, StageName, StageStatus};
use showset_workflow::versioning::{DeliverableType, VersionTrigger};
use showset_workflow::workflow::{
    ActivityKind, ErrorKind, RevisionNoteInput, SetVersionRequest, TransitionRequest,
    UnlockRequest, UpstreamRevisionRequest, VersionTarget, WorkflowError,
};

#[tokio::test]
async fn test_new_showset_bumps_only_on_reopen() {
    let h = Harness::new();
    let created = h.seed("AB-101").await;

    assert!(StageName::ALL
        .into_iter()
        .all(|s| created.status_of(s) == StageStatus::NotStarted));
    assert!(created.versions.counters().values().all(|v| *v == 1));
    assert!(created.versions.history().is_empty());

    let started = h
        .orchestrator
        .update_stage(&artist(), "AB-101", TransitionRequest::new("screen", StageStatus::InProgress))
        .await
        .unwrap();
    assert!(started.outcome.bump.is_none());

    let completed = h
        .orchestrator
        .update_stage(&artist(), "AB-101", TransitionRequest::new("screen", StageStatus::Complete))
        .await
        .unwrap();
    assert!(completed.outcome.bump.is_none());
    assert_eq!(
        completed.show_set.versions.current(DeliverableType::Screen),
        Some(1)
    );

    let reopened = h
        .orchestrator
        .update_stage(&artist(), "AB-101", TransitionRequest::new("screen", StageStatus::InProgress))
        .await
        .unwrap();
    let bump = reopened.outcome.bump.expect("reopen should bump");
    assert_eq!((bump.from, bump.to), (1, 2));
    assert_eq!(
        reopened.show_set.versions.current(DeliverableType::Screen),
        Some(2)
    );
    let history = reopened.show_set.versions.history();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].trigger,
        VersionTrigger::Rework {
            stage: StageName::Screen
        }
    );
    assert_eq!(history[0].created_by, "artist-1");

    let kinds = h.activity.kinds_for("AB-101").await;
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == ActivityKind::VersionBumped)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_rework_cascades_to_completed_downstream() {
    let h = Harness::new();
    h.seed("AB-102").await;
    h.orchestrator
        .set_version(
            &admin(),
            "AB-102",
            SetVersionRequest {
                deliverable: DeliverableType::Structure,
                target: VersionTarget::Exact(3),
                reason: None,
            },
        )
        .await
        .unwrap();
    h.force_statuses(
        "AB-102",
        &[
            (StageName::Structure, StageStatus::Complete),
            (StageName::Integrated, StageStatus::Complete),
            (StageName::Drawing2d, StageStatus::EngineerReview),
        ],
    )
    .await;

    let update = h
        .orchestrator
        .update_stage(
            &manager(),
            "AB-102",
            TransitionRequest::new("structure", StageStatus::InProgress),
        )
        .await
        .unwrap();

    let show_set = &update.show_set;
    assert_eq!(
        show_set.versions.current(DeliverableType::Structure),
        Some(4)
    );
    assert_eq!(
        show_set.versions.current(DeliverableType::Integrated),
        Some(1)
    );
    assert_eq!(
        show_set.status_of(StageName::Integrated),
        StageStatus::RevisionRequired
    );
    assert_eq!(show_set.status_of(StageName::InBim360), StageStatus::NotStarted);
    assert_eq!(
        show_set.status_of(StageName::Drawing2d),
        StageStatus::EngineerReview
    );
    assert_eq!(update.outcome.cascade.reset_stages(), vec![StageName::Integrated]);
    assert!(h
        .activity
        .kinds_for("AB-102")
        .await
        .contains(&ActivityKind::CascadeReset));
}

#[tokio::test]
async fn test_upstream_request_from_drawing2d_flags_every_earlier_stage() {
    let h = Harness::new();
    h.seed("AB-103").await;
    h.force_statuses("AB-103", &[(StageName::Drawing2d, StageStatus::InProgress)])
        .await;

    let revision = h
        .orchestrator
        .request_upstream_revision(
            &artist(),
            "AB-103",
            UpstreamRevisionRequest {
                target_stages: vec!["screen".to_string()],
                current_stage: "drawing2d".to_string(),
                note: RevisionNoteInput::new("Screen proportions are off", Language::En),
                attachment: None,
            },
        )
        .await
        .unwrap();

    let show_set = &revision.show_set;
    for stage in [
        StageName::Screen,
        StageName::Structure,
        StageName::Integrated,
        StageName::InBim360,
    ] {
        assert_eq!(show_set.status_of(stage), StageStatus::RevisionRequired);
    }
    assert_eq!(show_set.status_of(StageName::Drawing2d), StageStatus::InProgress);

    let note = show_set
        .stage(StageName::Screen)
        .and_then(|s| s.revision_note.as_ref())
        .expect("note attached at screen");
    assert_eq!(note.text, "Screen proportions are off");
    assert_eq!(note.note_id, revision.note.id);
    assert!(show_set.versions.history().is_empty());
}

#[tokio::test]
async fn test_lock_blocks_work_until_unlock_resets_named_stage() {
    let h = Harness::new();
    h.seed("AB-104").await;
    h.force_all("AB-104", StageStatus::Complete).await;
    h.orchestrator.lock_show_set(&admin(), "AB-104").await.unwrap();

    for actor in [admin(), manager(), artist()] {
        let err = h
            .orchestrator
            .update_stage(
                &actor,
                "AB-104",
                TransitionRequest::new("drawing2d", StageStatus::InProgress),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)), "{err:?}");
    }

    let unlock = h
        .orchestrator
        .unlock_show_set(
            &admin(),
            "AB-104",
            UnlockRequest {
                reason: Some("client change".to_string()),
                reset_stages: vec!["drawing2d".to_string()],
            },
        )
        .await
        .unwrap();
    let show_set = &unlock.show_set;
    assert!(show_set.lock.is_none());
    assert_eq!(
        show_set.status_of(StageName::Drawing2d),
        StageStatus::RevisionRequired
    );
    assert_eq!(show_set.status_of(StageName::Screen), StageStatus::Complete);
    assert_eq!(show_set.status_of(StageName::Integrated), StageStatus::Complete);

    let reopened = h
        .orchestrator
        .update_stage(
            &artist(),
            "AB-104",
            TransitionRequest::new("drawing2d", StageStatus::InProgress),
        )
        .await
        .unwrap();
    assert_eq!(
        reopened.show_set.status_of(StageName::Drawing2d),
        StageStatus::InProgress
    );
}

#[tokio::test]
async fn test_set_version_without_right_is_forbidden() {
    let h = Harness::new();
    let seeded = h.seed("AB-105").await;

    let err = h
        .orchestrator
        .set_version(
            &manager(),
            "AB-105",
            SetVersionRequest {
                deliverable: DeliverableType::Screen,
                target: VersionTarget::Exact(5),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let after = h.load("AB-105").await;
    assert_eq!(after.revision, seeded.revision);
    assert_eq!(after.versions.current(DeliverableType::Screen), Some(1));
}

#[tokio::test]
async fn test_concurrent_conflicting_updates_apply_exactly_once() {
    let h = HarnessBuilder::new()
        .store(Arc::new(YieldingStore::new()))
        .build();
    h.seed("AB-106").await;

    let first = TransitionRequest::new("screen", StageStatus::InProgress);
    let second = TransitionRequest::new("screen", StageStatus::OnHold);
    let (admin, manager) = (admin(), manager());
    let (a, b) = tokio::join!(
        h.orchestrator.update_stage(&admin, "AB-106", first),
        h.orchestrator.update_stage(&manager, "AB-106", second),
    );

    let (winner, loser) = match (a, b) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert!(matches!(loser, WorkflowError::Conflict { .. }));
    assert!(loser.is_retryable());

    let stored = h.load("AB-106").await;
    assert_eq!(stored.revision, winner.show_set.revision);
    assert_eq!(
        stored.status_of(StageName::Screen),
        winner.outcome.after.status
    );
    assert_eq!(
        stored.stage(StageName::Screen).and_then(|s| s.updated_by.clone()),
        winner.outcome.after.updated_by
    );
}

#[tokio::test]
async fn test_revision_required_needs_note() {
    let h = Harness::new();
    h.seed("AB-107").await;

    let err = h
        .orchestrator
        .update_stage(
            &artist(),
            "AB-107",
            TransitionRequest::new("structure", StageStatus::RevisionRequired),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let err = h
        .orchestrator
        .update_stage(
            &artist(),
            "AB-107",
            TransitionRequest::new("structure", StageStatus::RevisionRequired)
                .with_note(RevisionNoteInput::new("   ", Language::En)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let update = h
        .orchestrator
        .update_stage(
            &artist(),
            "AB-107",
            TransitionRequest::new("structure", StageStatus::RevisionRequired)
                .with_note(RevisionNoteInput::new("柱の位置を修正", Language::Ja)),
        )
        .await
        .unwrap();
    let note = update.outcome.note.expect("note created");
    let stage = update.show_set.stage(StageName::Structure).unwrap();
    assert_eq!(
        stage.revision_note.as_ref().map(|n| n.note_id),
        Some(note.id)
    );
    assert_eq!(note.language, Language::Ja);

    let mut jobs = h.jobs;
    let job = jobs.recv().await.expect("translation job queued");
    assert_eq!(job.note_id, note.id);
}

#[tokio::test]
async fn test_external_sync_stage_rejects_revision_and_ignores_assignee() {
    let h = Harness::new();
    h.seed("AB-108").await;

    let err = h
        .orchestrator
        .update_stage(
            &admin(),
            "AB-108",
            TransitionRequest::new("inBim360", StageStatus::RevisionRequired)
                .with_note(RevisionNoteInput::new("resync", Language::En)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let update = h
        .orchestrator
        .update_stage(
            &admin(),
            "AB-108",
            TransitionRequest::new("inBim360", StageStatus::InProgress)
                .with_assignee(FieldUpdate::Set("ken".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(
        update.show_set.stage(StageName::InBim360).and_then(|s| s.assignee.clone()),
        None
    );
}

#[tokio::test]
async fn test_assignee_and_label_are_tracked() {
    let h = Harness::new();
    h.seed("AB-109").await;

    let update = h
        .orchestrator
        .update_stage(
            &manager(),
            "AB-109",
            TransitionRequest::new("integrated", StageStatus::InProgress)
                .with_assignee(FieldUpdate::Set("ken".to_string()))
                .with_version_label(FieldUpdate::Set("v1-draft".to_string())),
        )
        .await
        .unwrap();
    assert!(update.outcome.assignee_changed());
    assert!(update.outcome.version_label_changed());

    let cleared = h
        .orchestrator
        .update_stage(
            &manager(),
            "AB-109",
            TransitionRequest::new("integrated", StageStatus::InProgress)
                .with_assignee(FieldUpdate::Clear),
        )
        .await
        .unwrap();
    let stage = cleared.show_set.stage(StageName::Integrated).unwrap();
    assert_eq!(stage.assignee, None);
    assert_eq!(stage.version_label.as_deref(), Some("v1-draft"));

    let kinds = h.activity.kinds_for("AB-109").await;
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == ActivityKind::AssigneeChanged)
            .count(),
        2
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == ActivityKind::VersionLabelChanged)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_reviewer_may_only_resolve_own_review() {
    let h = Harness::new();
    h.seed("AB-110").await;

    let err = h
        .orchestrator
        .update_stage(
            &engineer(),
            "AB-110",
            TransitionRequest::new("structure", StageStatus::Complete),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    h.force_statuses("AB-110", &[(StageName::Structure, StageStatus::EngineerReview)])
        .await;
    let update = h
        .orchestrator
        .update_stage(
            &engineer(),
            "AB-110",
            TransitionRequest::new("structure", StageStatus::Complete),
        )
        .await
        .unwrap();
    assert_eq!(
        update.show_set.status_of(StageName::Structure),
        StageStatus::Complete
    );

    let err = h
        .orchestrator
        .update_stage(
            &viewer(),
            "AB-110",
            TransitionRequest::new("structure", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}

#[tokio::test]
async fn test_unknown_stage_and_showset() {
    let h = Harness::new();
    h.seed("AB-111").await;

    let err = h
        .orchestrator
        .update_stage(
            &admin(),
            "AB-111",
            TransitionRequest::new("bim", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidStage(ref s) if s == "bim"));

    let err = h
        .orchestrator
        .update_stage(
            &admin(),
            "ZZ-999",
            TransitionRequest::new("screen", StageStatus::InProgress),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
