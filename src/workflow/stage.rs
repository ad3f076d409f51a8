// Stage State Machine - guarded status changes on a single stage
//
// A transition checks its preconditions against the unmodified ShowSet, then
// applies the stage replacement, the automatic version bump, the configured
// downstream cascade and the lock hook to the same working copy. Nothing here
// touches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

use super::cascade::{CascadeContext, CascadeOutcome, CascadePolicy};
use super::error::WorkflowError;
use super::lock::LockPolicy;
use crate::permissions::{Actor, PermissionResolver};
use crate::showset::{
    AttachmentRef, DiscussionItem, DiscussionKind, FieldUpdate, Language, RevisionNote, ShowSet,
    Stage, StageName, StageStatus,
};
use crate::versioning::{VersionBump, VersionError, VersionScheme, VersionTrigger};

/// Deployment rules that shape transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRules {
    pub scheme: VersionScheme,
    /// Stages that may be moved to `revision_required` directly.
    pub revision_eligible: BTreeSet<StageName>,
}

impl Default for StageRules {
    fn default() -> Self {
        Self {
            scheme: VersionScheme::PerStage,
            revision_eligible: StageName::ALL
                .into_iter()
                .filter(|s| *s != StageName::InBim360)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionNoteInput {
    pub text: String,
    pub language: Language,
}

impl RevisionNoteInput {
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A caller's request to move one stage. The stage name is kept as given so
/// that unknown names surface as `InvalidStage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub stage: String,
    pub status: StageStatus,
    pub assignee: FieldUpdate<String>,
    pub version_label: FieldUpdate<String>,
    pub note: Option<RevisionNoteInput>,
}

impl TransitionRequest {
    pub fn new(stage: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage: stage.into(),
            status,
            assignee: FieldUpdate::Keep,
            version_label: FieldUpdate::Keep,
            note: None,
        }
    }

    pub fn with_assignee(mut self, assignee: FieldUpdate<String>) -> Self {
        self.assignee = assignee;
        self
    }

    pub fn with_version_label(mut self, label: FieldUpdate<String>) -> Self {
        self.version_label = label;
        self
    }

    pub fn with_note(mut self, note: RevisionNoteInput) -> Self {
        self.note = Some(note);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub stage: StageName,
    pub before: Stage,
    pub after: Stage,
    pub bump: Option<VersionBump>,
    pub cascade: CascadeOutcome,
    pub note: Option<DiscussionItem>,
}

impl TransitionOutcome {
    pub fn status_changed(&self) -> bool {
        self.before.status != self.after.status
    }

    pub fn assignee_changed(&self) -> bool {
        self.before.assignee != self.after.assignee
    }

    pub fn version_label_changed(&self) -> bool {
        self.before.version_label != self.after.version_label
    }
}

/// Version numbers only move on this edge.
pub fn bumps_version(prior: StageStatus, requested: StageStatus) -> bool {
    matches!(
        prior,
        StageStatus::Complete | StageStatus::RevisionRequired
    ) && requested == StageStatus::InProgress
}

/// Applies the automatic bump for `ctx.stage` if the edge calls for one and
/// the stage has a deliverable.
pub fn auto_bump(
    show_set: &mut ShowSet,
    ctx: &CascadeContext<'_>,
    trigger: VersionTrigger,
) -> Result<Option<VersionBump>, VersionError> {
    if !bumps_version(ctx.prior, ctx.requested) {
        return Ok(None);
    }
    let Some(deliverable) = ctx.scheme.deliverable_for(ctx.stage) else {
        return Ok(None);
    };
    show_set
        .versions
        .bump(deliverable, trigger, &ctx.actor.id, ctx.now)
        .map(Some)
}

/// Builds a discussion item authored by `actor`.
pub fn new_discussion_item(
    stage: StageName,
    input: &RevisionNoteInput,
    kind: DiscussionKind,
    attachments: Vec<AttachmentRef>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> DiscussionItem {
    DiscussionItem {
        id: Uuid::new_v4(),
        stage,
        kind,
        text: input.text.trim().to_string(),
        language: input.language,
        author_id: actor.id.clone(),
        author_name: actor.name.clone(),
        created_at: now,
        attachments,
    }
}

/// Posts `item` to the ShowSet and records it as the revision note of its
/// stage.
pub fn attach_revision_note(show_set: &mut ShowSet, item: &DiscussionItem) {
    show_set.stage_mut(item.stage).revision_note = Some(RevisionNote {
        note_id: item.id,
        text: item.text.clone(),
        language: item.language,
        author: item.author_id.clone(),
        created_at: item.created_at,
    });
    show_set.discussion.push(item.clone());
}

pub struct StageMachine<'a> {
    permissions: &'a dyn PermissionResolver,
    cascade: &'a dyn CascadePolicy,
    lock: &'a dyn LockPolicy,
    rules: &'a StageRules,
}

impl<'a> StageMachine<'a> {
    pub fn new(
        permissions: &'a dyn PermissionResolver,
        cascade: &'a dyn CascadePolicy,
        lock: &'a dyn LockPolicy,
        rules: &'a StageRules,
    ) -> Self {
        Self {
            permissions,
            cascade,
            lock,
            rules,
        }
    }

    /// Runs the preconditions in their fixed order and returns the parsed
    /// stage.
    pub fn check(
        &self,
        show_set: &ShowSet,
        request: &TransitionRequest,
        actor: &Actor,
    ) -> Result<StageName, WorkflowError> {
        let stage: StageName = request.stage.parse()?;

        let permissions = self.permissions.resolve(actor.role);
        if !permissions.can_update_stage(stage) {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not update stage {}",
                actor.role, stage
            )));
        }
        if let Some(restriction) = permissions.restriction() {
            let current = show_set.status_of(stage);
            if !restriction.permits(current, request.status) {
                return Err(WorkflowError::forbidden(format!(
                    "role {} may only resolve {} (stage {} is {}, requested {})",
                    actor.role, restriction.review_status, stage, current, request.status
                )));
            }
        }

        if request.status == StageStatus::RevisionRequired {
            if !self.rules.revision_eligible.contains(&stage) {
                return Err(WorkflowError::validation(format!(
                    "stage {stage} does not accept revision requests"
                )));
            }
            if request.note.as_ref().map_or(true, RevisionNoteInput::is_blank) {
                return Err(WorkflowError::validation(
                    "a revision note is required to request a revision",
                ));
            }
        }

        if request.status == StageStatus::InProgress && self.lock.is_locked(show_set) {
            return Err(WorkflowError::forbidden(format!(
                "showset {} is locked; unlock it before starting work",
                show_set.id
            )));
        }

        // A ShowSet created under another version scheme has no counter to bump.
        if bumps_version(show_set.status_of(stage), request.status) {
            if let Some(deliverable) = self.rules.scheme.deliverable_for(stage) {
                if show_set.versions.current(deliverable).is_none() {
                    return Err(VersionError::UnknownDeliverable(deliverable).into());
                }
            }
        }

        Ok(stage)
    }

    pub fn transition(
        &self,
        show_set: &mut ShowSet,
        request: &TransitionRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let stage = self.check(show_set, request, actor)?;
        let before = show_set.stage(stage).cloned().unwrap_or_default();

        {
            let record = show_set.stage_mut(stage);
            record.status = request.status;
            record.updated_by = Some(actor.id.clone());
            record.updated_at = Some(now);
            if stage.supports_assignment() {
                request.assignee.apply(&mut record.assignee);
                request.version_label.apply(&mut record.version_label);
            } else if !request.assignee.is_keep() || !request.version_label.is_keep() {
                debug!(stage = %stage, "Ignoring assignee/label for stage without assignment");
            }
        }

        let note = request.note.as_ref().map(|input| {
            let item =
                new_discussion_item(stage, input, DiscussionKind::Note, Vec::new(), actor, now);
            if request.status == StageStatus::RevisionRequired {
                attach_revision_note(show_set, &item);
            } else {
                show_set.discussion.push(item.clone());
            }
            item
        });

        let ctx = CascadeContext {
            stage,
            prior: before.status,
            requested: request.status,
            scheme: self.rules.scheme,
            actor,
            now,
        };
        let bump = auto_bump(show_set, &ctx, VersionTrigger::Rework { stage })?;
        let cascade = self.cascade.on_transition(show_set, &ctx);
        self.lock.on_status_change(show_set, stage, request.status);
        show_set.updated_at = now;

        let after = show_set.stage(stage).cloned().unwrap_or_default();
        info!(
            show_set_id = %show_set.id,
            stage = %stage,
            from = %before.status,
            to = %after.status,
            actor = %actor.id,
            bumped = bump.is_some(),
            cascaded = cascade.resets.len(),
            "Stage transition applied"
        );

        Ok(TransitionOutcome {
            stage,
            before,
            after,
            bump,
            cascade,
            note,
        })
    }
}
