// Workflow Orchestrator - the public entry point for every ShowSet operation
//
// Each operation reads the ShowSet once, computes every effect on a working
// copy, and commits the difference as one conditional write keyed on the
// revision it read. Activity records, translation jobs and upload handles are
// produced after the commit and never fail the operation.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::activity::{ActivityKind, ActivityRecord, ActivitySink};
use super::attachments::{AttachmentDescriptor, UploadHandle, UploadSigner};
use super::cascade::{
    apply_recall_resets, apply_upstream_revision, upstream_revision_span, CascadeContext,
    CascadePolicy, ReworkCascade, StageReset,
};
use super::error::WorkflowError;
use super::lock::{reset_completed, ExplicitAdminLock, LockPolicy};
use super::stage::{
    attach_revision_note, auto_bump, new_discussion_item, RevisionNoteInput, StageMachine,
    StageRules, TransitionOutcome, TransitionRequest,
};
use super::translation::{TranslationJob, TranslationQueue};
use crate::observability::workflow_metrics;
use crate::permissions::{Actor, PermissionResolver, PermissionSet};
use crate::showset::{
    Area, AttachmentRef, DiscussionItem, DiscussionKind, FieldUpdate, Links, LocalizedText,
    ShowSet, ShowSetId, ShowSetPatch, StageName, StageStatus,
};
use crate::store::ShowSetStore;
use crate::versioning::{DeliverableType, VersionBump, VersionError, VersionHistoryEntry, VersionTrigger};

pub const DEFAULT_ATTACHMENT_BUCKET: &str = "showset-attachments";
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 25 * 1024 * 1024;

/// Deployment settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub rules: StageRules,
    /// When set, new ShowSet ids must match.
    pub id_pattern: Option<Regex>,
    pub attachment_bucket: String,
    pub max_attachment_bytes: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            rules: StageRules::default(),
            id_pattern: None,
            attachment_bucket: DEFAULT_ATTACHMENT_BUCKET.to_string(),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShowSet {
    pub id: String,
    pub area: Area,
    pub scene: String,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub related_items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinksUpdate {
    pub model_viewer: FieldUpdate<String>,
    pub bim360: FieldUpdate<String>,
    pub drawing_set: FieldUpdate<String>,
    pub reference_folder: FieldUpdate<String>,
}

impl LinksUpdate {
    /// Applies the update and returns the names of the fields that changed.
    pub fn apply(&self, links: &mut Links) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.model_viewer.apply(&mut links.model_viewer) {
            changed.push("model_viewer");
        }
        if self.bim360.apply(&mut links.bim360) {
            changed.push("bim360");
        }
        if self.drawing_set.apply(&mut links.drawing_set) {
            changed.push("drawing_set");
        }
        if self.reference_folder.apply(&mut links.reference_folder) {
            changed.push("reference_folder");
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageUpdate {
    pub show_set: ShowSet,
    pub outcome: TransitionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRevisionRequest {
    pub target_stages: Vec<String>,
    pub current_stage: String,
    pub note: RevisionNoteInput,
    pub attachment: Option<AttachmentDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRevision {
    pub show_set: ShowSet,
    /// Every stage in `[earliest target, current)`.
    pub flagged: Vec<StageName>,
    /// The subset of `flagged` whose status actually changed.
    pub resets: Vec<StageReset>,
    pub note: DiscussionItem,
    pub upload: Option<UploadHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecallRequest {
    pub from: String,
    pub target: String,
    /// `in_progress` or `revision_required`.
    pub status: StageStatus,
    pub note: Option<RevisionNoteInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recall {
    pub show_set: ShowSet,
    pub bump: Option<VersionBump>,
    pub resets: Vec<StageReset>,
    pub note: Option<DiscussionItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockRequest {
    pub reason: Option<String>,
    /// Stages to send back to `revision_required` if currently `complete`.
    pub reset_stages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unlock {
    pub show_set: ShowSet,
    pub resets: Vec<StageReset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum VersionTarget {
    Exact(u32),
    Increment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetVersionRequest {
    pub deliverable: DeliverableType,
    pub target: VersionTarget,
    pub reason: Option<RevisionNoteInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VersionEdit {
    /// The target equalled the current value; nothing was written.
    Unchanged { show_set: ShowSet, version: u32 },
    Changed { show_set: ShowSet, bump: VersionBump },
}

impl VersionEdit {
    pub fn show_set(&self) -> &ShowSet {
        match self {
            VersionEdit::Unchanged { show_set, .. } | VersionEdit::Changed { show_set, .. } => {
                show_set
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscussionThread {
    Note,
    Issue,
    Reply { parent_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionPost {
    pub stage: String,
    pub thread: DiscussionThread,
    pub body: RevisionNoteInput,
    pub attachments: Vec<AttachmentDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostedDiscussion {
    pub show_set: ShowSet,
    pub item: DiscussionItem,
    pub uploads: Vec<UploadHandle>,
}

pub struct WorkflowOrchestrator {
    store: Arc<dyn ShowSetStore>,
    permissions: Arc<dyn PermissionResolver>,
    activity: Arc<dyn ActivitySink>,
    translations: Arc<dyn TranslationQueue>,
    uploads: Arc<dyn UploadSigner>,
    cascade: Arc<dyn CascadePolicy>,
    lock: Arc<dyn LockPolicy>,
    settings: OrchestratorSettings,
}

impl WorkflowOrchestrator {
    /// Builds an orchestrator with the rework cascade and explicit admin lock.
    pub fn new(
        store: Arc<dyn ShowSetStore>,
        permissions: Arc<dyn PermissionResolver>,
        activity: Arc<dyn ActivitySink>,
        translations: Arc<dyn TranslationQueue>,
        uploads: Arc<dyn UploadSigner>,
    ) -> Self {
        Self {
            store,
            permissions,
            activity,
            translations,
            uploads,
            cascade: Arc::new(ReworkCascade),
            lock: Arc::new(ExplicitAdminLock),
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_cascade_policy(mut self, cascade: Arc<dyn CascadePolicy>) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_lock_policy(mut self, lock: Arc<dyn LockPolicy>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn cascade_policy(&self) -> &'static str {
        self.cascade.name()
    }

    pub fn lock_policy(&self) -> &'static str {
        self.lock.name()
    }

    pub fn is_locked(&self, show_set: &ShowSet) -> bool {
        self.lock.is_locked(show_set)
    }

    fn stage_machine(&self) -> StageMachine<'_> {
        StageMachine::new(
            self.permissions.as_ref(),
            self.cascade.as_ref(),
            self.lock.as_ref(),
            &self.settings.rules,
        )
    }

    fn resolve(&self, actor: &Actor) -> PermissionSet {
        self.permissions.resolve(actor.role)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(show_set_id = %request.id, actor = %actor.id))]
    pub async fn create_show_set(
        &self,
        actor: &Actor,
        request: NewShowSet,
    ) -> Result<ShowSet, WorkflowError> {
        if !self.resolve(actor).can_manage_show_sets() {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not create showsets",
                actor.role
            )));
        }
        let id = request.id.trim();
        if id.is_empty() {
            return Err(WorkflowError::validation("showset id is empty"));
        }
        if let Some(pattern) = &self.settings.id_pattern {
            if !pattern.is_match(id) {
                return Err(WorkflowError::validation(format!(
                    "showset id '{id}' does not match pattern {}",
                    pattern.as_str()
                )));
            }
        }
        if request.scene.trim().is_empty() {
            return Err(WorkflowError::validation("scene is required"));
        }

        let now = Utc::now();
        let mut show_set = ShowSet::new(
            ShowSetId::new(id),
            request.area,
            request.scene.trim(),
            self.settings.rules.scheme,
            now,
        );
        show_set.description = request.description;
        show_set.related_items = request.related_items;

        let stored = self.store.create(&show_set).await?;
        info!(show_set_id = %stored.id, "ShowSet created");

        self.record_activity(vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::ShowSetCreated,
            json!({ "area": stored.area, "scene": stored.scene }),
            now,
        )])
        .await;
        Ok(stored)
    }

    pub async fn get_show_set(&self, id: &str) -> Result<ShowSet, WorkflowError> {
        self.load(id).await
    }

    pub async fn list_show_sets(&self) -> Result<Vec<ShowSet>, WorkflowError> {
        Ok(self.store.list().await?)
    }

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id))]
    pub async fn delete_show_set(&self, actor: &Actor, id: &str) -> Result<(), WorkflowError> {
        if !self.resolve(actor).can_manage_show_sets() {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not delete showsets",
                actor.role
            )));
        }
        let show_set_id = ShowSetId::new(id);
        if !self.store.delete(&show_set_id).await? {
            return Err(WorkflowError::NotFound(format!("showset {id}")));
        }
        info!(show_set_id = %show_set_id, "ShowSet deleted");

        self.record_activity(vec![ActivityRecord::new(
            &show_set_id,
            actor,
            ActivityKind::ShowSetDeleted,
            json!({}),
            Utc::now(),
        )])
        .await;
        Ok(())
    }

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id))]
    pub async fn update_links(
        &self,
        actor: &Actor,
        id: &str,
        update: LinksUpdate,
    ) -> Result<ShowSet, WorkflowError> {
        if !self.resolve(actor).can_manage_links() {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not manage links",
                actor.role
            )));
        }
        let before = self.load(id).await?;
        let mut working = before.clone();
        let changed = update.apply(&mut working.links);
        if changed.is_empty() {
            return Ok(before);
        }
        let now = Utc::now();
        working.updated_at = now;
        let stored = self.commit(&before, &working).await?;

        self.record_activity(vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::LinksUpdated,
            json!({ "fields": changed }),
            now,
        )])
        .await;
        Ok(stored)
    }

    // ------------------------------------------------------------------
    // Stage workflow
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id, stage = %request.stage))]
    pub async fn update_stage(
        &self,
        actor: &Actor,
        id: &str,
        request: TransitionRequest,
    ) -> Result<StageUpdate, WorkflowError> {
        crate::time_operation!("update_stage");
        let before = self.load(id).await?;
        let mut working = before.clone();
        let now = Utc::now();

        let outcome = self
            .stage_machine()
            .transition(&mut working, &request, actor, now)?;
        let stored = self.commit(&before, &working).await?;

        let metrics = workflow_metrics();
        metrics.record_transition();
        if outcome.bump.is_some() {
            metrics.record_version_bump();
        }
        metrics.record_cascade_resets(outcome.cascade.resets.len());
        for _ in &outcome.cascade.bumps {
            metrics.record_version_bump();
        }

        self.record_activity(transition_records(&stored.id, actor, &outcome, now))
            .await;
        if let Some(note) = &outcome.note {
            self.request_translation(&stored.id, note).await;
        }

        Ok(StageUpdate {
            show_set: stored,
            outcome,
        })
    }

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id, current = %request.current_stage))]
    pub async fn request_upstream_revision(
        &self,
        actor: &Actor,
        id: &str,
        request: UpstreamRevisionRequest,
    ) -> Result<UpstreamRevision, WorkflowError> {
        crate::time_operation!("request_upstream_revision");
        if !self.resolve(actor).can_request_upstream_revision() {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not request revisions",
                actor.role
            )));
        }
        let current: StageName = request.current_stage.parse()?;
        let targets = request
            .target_stages
            .iter()
            .map(|s| s.parse::<StageName>())
            .collect::<Result<Vec<_>, _>>()?;
        let flagged = upstream_revision_span(&targets, current).map_err(WorkflowError::Validation)?;

        let before = self.load(id).await?;
        if self.lock.is_locked(&before) {
            return Err(WorkflowError::forbidden(format!(
                "showset {} is locked",
                before.id
            )));
        }
        if let Some(attachment) = &request.attachment {
            attachment.validate(self.settings.max_attachment_bytes)?;
        }
        if request.note.is_blank() {
            return Err(WorkflowError::validation(
                "a revision note is required to request a revision",
            ));
        }

        let now = Utc::now();
        let mut working = before.clone();
        let resets = apply_upstream_revision(&mut working, &flagged, actor, now);

        // `flagged` is non-empty: the earliest target is always in it.
        let earliest = flagged.first().copied().unwrap_or(current);
        let mut note = new_discussion_item(
            earliest,
            &request.note,
            DiscussionKind::Note,
            Vec::new(),
            actor,
            now,
        );
        if let Some(attachment) = &request.attachment {
            note.attachments.push(attachment.bind(&working.id, note.id));
        }
        attach_revision_note(&mut working, &note);
        working.updated_at = now;

        let stored = self.commit(&before, &working).await?;
        workflow_metrics().record_cascade_resets(resets.len());
        info!(
            show_set_id = %stored.id,
            current = %current,
            flagged = ?flagged,
            "Upstream revision requested"
        );

        self.record_activity(vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::UpstreamRevisionRequested,
            json!({
                "current_stage": current,
                "targets": targets,
                "reset": resets.iter().map(|r| r.stage).collect::<Vec<_>>(),
                "note_id": note.id,
                "attachment": note.attachments.first().map(|a| a.key.clone()),
            }),
            now,
        )])
        .await;
        self.request_translation(&stored.id, &note).await;
        let upload = match note.attachments.first() {
            Some(attachment) => self.issue_upload(attachment).await,
            None => None,
        };

        Ok(UpstreamRevision {
            show_set: stored,
            flagged,
            resets,
            note,
            upload,
        })
    }

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id, from = %request.from, target = %request.target))]
    pub async fn recall_from_review(
        &self,
        actor: &Actor,
        id: &str,
        request: RecallRequest,
    ) -> Result<Recall, WorkflowError> {
        crate::time_operation!("recall_from_review");
        let from: StageName = request.from.parse()?;
        let target: StageName = request.target.parse()?;
        if !matches!(
            request.status,
            StageStatus::InProgress | StageStatus::RevisionRequired
        ) {
            return Err(WorkflowError::validation(format!(
                "recall may only move the target to in_progress or revision_required, not {}",
                request.status
            )));
        }

        let before = self.load(id).await?;
        let from_status = before.status_of(from);
        if !from_status.is_review() {
            return Err(WorkflowError::validation(format!(
                "stage {from} is {from_status}, not under review"
            )));
        }
        if target > from {
            return Err(WorkflowError::validation(format!(
                "recall target {target} is downstream of {from}"
            )));
        }
        if !self.resolve(actor).can_update_stage(target) {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not update stage {}",
                actor.role, target
            )));
        }
        if request.status == StageStatus::InProgress && self.lock.is_locked(&before) {
            return Err(WorkflowError::forbidden(format!(
                "showset {} is locked",
                before.id
            )));
        }
        if request.note.as_ref().is_some_and(RevisionNoteInput::is_blank) {
            return Err(WorkflowError::validation("recall note is empty"));
        }

        let now = Utc::now();
        let mut working = before.clone();
        let prior = working.status_of(target);
        {
            let record = working.stage_mut(target);
            record.status = request.status;
            record.updated_by = Some(actor.id.clone());
            record.updated_at = Some(now);
        }
        let ctx = CascadeContext {
            stage: target,
            prior,
            requested: request.status,
            scheme: self.settings.rules.scheme,
            actor,
            now,
        };
        let bump = auto_bump(&mut working, &ctx, VersionTrigger::Recall { from, target })?;
        let resets = apply_recall_resets(&mut working, from, target, actor, now);
        let note = request.note.as_ref().map(|input| {
            let item =
                new_discussion_item(target, input, DiscussionKind::Note, Vec::new(), actor, now);
            if request.status == StageStatus::RevisionRequired {
                attach_revision_note(&mut working, &item);
            } else {
                working.discussion.push(item.clone());
            }
            item
        });
        working.updated_at = now;

        let stored = self.commit(&before, &working).await?;
        let metrics = workflow_metrics();
        metrics.record_transition();
        metrics.record_cascade_resets(resets.len());
        if bump.is_some() {
            metrics.record_version_bump();
        }
        info!(
            show_set_id = %stored.id,
            from = %from,
            target = %target,
            status = %request.status,
            bumped = bump.is_some(),
            "Recalled from review"
        );

        let mut records = vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::Recalled,
            json!({
                "from": from,
                "target": target,
                "status": request.status,
                "started_work": request.status == StageStatus::InProgress,
                "reset": resets.iter().map(|r| r.stage).collect::<Vec<_>>(),
                "version_bumped": bump.is_some(),
            }),
            now,
        )];
        if let Some(bump) = &bump {
            records.push(bump_record(&stored.id, actor, target, bump, &VersionTrigger::Recall { from, target }, now));
        }
        self.record_activity(records).await;
        if let Some(item) = &note {
            self.request_translation(&stored.id, item).await;
        }

        Ok(Recall {
            show_set: stored,
            bump,
            resets,
            note,
        })
    }

    // ------------------------------------------------------------------
    // Lock gate
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id))]
    pub async fn lock_show_set(&self, actor: &Actor, id: &str) -> Result<ShowSet, WorkflowError> {
        if !self.resolve(actor).can_manage_locks() {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not lock showsets",
                actor.role
            )));
        }
        let before = self.load(id).await?;
        let mut working = before.clone();
        let now = Utc::now();
        self.lock.lock(&mut working, actor, now)?;
        working.updated_at = now;
        let stored = self.commit(&before, &working).await?;
        info!(show_set_id = %stored.id, policy = self.lock.name(), "ShowSet locked");

        self.record_activity(vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::Locked,
            json!({ "policy": self.lock.name() }),
            now,
        )])
        .await;
        Ok(stored)
    }

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id))]
    pub async fn unlock_show_set(
        &self,
        actor: &Actor,
        id: &str,
        request: UnlockRequest,
    ) -> Result<Unlock, WorkflowError> {
        if !self.resolve(actor).can_manage_locks() {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not unlock showsets",
                actor.role
            )));
        }
        let stages = request
            .reset_stages
            .iter()
            .map(|s| s.parse::<StageName>())
            .collect::<Result<Vec<_>, _>>()?;

        let before = self.load(id).await?;
        let mut working = before.clone();
        let now = Utc::now();
        self.lock
            .unlock(&mut working, actor, request.reason.as_deref(), now)?;
        let resets = reset_completed(&mut working, &stages, actor, now);
        working.updated_at = now;

        let stored = self.commit(&before, &working).await?;
        workflow_metrics().record_cascade_resets(resets.len());
        info!(
            show_set_id = %stored.id,
            policy = self.lock.name(),
            reset = resets.len(),
            "ShowSet unlocked"
        );

        self.record_activity(vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::Unlocked,
            json!({
                "policy": self.lock.name(),
                "reason": request.reason,
                "requested": stages,
                "reset": resets.iter().map(|r| r.stage).collect::<Vec<_>>(),
            }),
            now,
        )])
        .await;
        Ok(Unlock {
            show_set: stored,
            resets,
        })
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id, deliverable = %request.deliverable))]
    pub async fn set_version(
        &self,
        actor: &Actor,
        id: &str,
        request: SetVersionRequest,
    ) -> Result<VersionEdit, WorkflowError> {
        if !self.resolve(actor).can_edit_versions(actor) {
            return Err(WorkflowError::forbidden(format!(
                "{} may not edit versions",
                actor.id
            )));
        }
        let before = self.load(id).await?;
        let current = before
            .versions
            .current(request.deliverable)
            .ok_or(VersionError::UnknownDeliverable(request.deliverable))?;
        let target = match request.target {
            VersionTarget::Exact(target) => target,
            VersionTarget::Increment => current.saturating_add(1),
        };

        let now = Utc::now();
        let mut working = before.clone();
        let reason = request
            .reason
            .as_ref()
            .filter(|r| !r.is_blank())
            .map(|r| LocalizedText::from_source(r.language, r.text.trim()));
        let Some(bump) = working
            .versions
            .set(request.deliverable, target, reason, &actor.id, now)?
        else {
            info!(
                show_set_id = %before.id,
                deliverable = %request.deliverable,
                version = current,
                "Version unchanged"
            );
            return Ok(VersionEdit::Unchanged {
                show_set: before,
                version: current,
            });
        };
        working.updated_at = now;

        let stored = self.commit(&before, &working).await?;
        info!(
            show_set_id = %stored.id,
            deliverable = %bump.deliverable,
            from = bump.from,
            to = bump.to,
            "Version set manually"
        );

        self.record_activity(vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::VersionEdited,
            json!({
                "deliverable": bump.deliverable,
                "from": bump.from,
                "to": bump.to,
                "history_id": bump.history_id,
            }),
            now,
        )])
        .await;
        Ok(VersionEdit::Changed {
            show_set: stored,
            bump,
        })
    }

    pub async fn version_history(
        &self,
        id: &str,
        deliverable: Option<DeliverableType>,
    ) -> Result<Vec<VersionHistoryEntry>, WorkflowError> {
        let show_set = self.load(id).await?;
        Ok(show_set
            .versions
            .history()
            .iter()
            .filter(|entry| deliverable.map_or(true, |d| entry.deliverable == d))
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------
    // Discussion
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(show_set_id = %id, actor = %actor.id, stage = %post.stage))]
    pub async fn add_discussion_item(
        &self,
        actor: &Actor,
        id: &str,
        post: DiscussionPost,
    ) -> Result<PostedDiscussion, WorkflowError> {
        let stage: StageName = post.stage.parse()?;
        if !self.resolve(actor).can_request_upstream_revision() {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not post to discussions",
                actor.role
            )));
        }
        if post.body.is_blank() {
            return Err(WorkflowError::validation("discussion text is empty"));
        }
        for attachment in &post.attachments {
            attachment.validate(self.settings.max_attachment_bytes)?;
        }

        let before = self.load(id).await?;
        let mut working = before.clone();
        let now = Utc::now();

        let kind = match post.thread {
            DiscussionThread::Note => DiscussionKind::Note,
            DiscussionThread::Issue => DiscussionKind::Issue {
                parent_id: None,
                reply_count: 0,
            },
            DiscussionThread::Reply { parent_id } => {
                let parent = working
                    .discussion
                    .iter_mut()
                    .find(|item| item.id == parent_id)
                    .ok_or_else(|| WorkflowError::NotFound(format!("discussion item {parent_id}")))?;
                match &mut parent.kind {
                    DiscussionKind::Issue {
                        parent_id: None,
                        reply_count,
                    } => *reply_count += 1,
                    _ => {
                        return Err(WorkflowError::validation(format!(
                            "discussion item {parent_id} is not a top-level issue"
                        )))
                    }
                }
                DiscussionKind::Issue {
                    parent_id: Some(parent_id),
                    reply_count: 0,
                }
            }
        };

        let mut item = new_discussion_item(stage, &post.body, kind, Vec::new(), actor, now);
        item.attachments = post
            .attachments
            .iter()
            .map(|descriptor| descriptor.bind(&working.id, item.id))
            .collect();
        working.discussion.push(item.clone());
        working.updated_at = now;

        let stored = self.commit(&before, &working).await?;

        self.record_activity(vec![ActivityRecord::new(
            &stored.id,
            actor,
            ActivityKind::DiscussionPosted,
            json!({
                "item_id": item.id,
                "stage": stage,
                "thread": post.thread,
                "attachments": item.attachments.len(),
            }),
            now,
        )])
        .await;
        self.request_translation(&stored.id, &item).await;
        let mut uploads = Vec::new();
        for attachment in &item.attachments {
            if let Some(handle) = self.issue_upload(attachment).await {
                uploads.push(handle);
            }
        }

        Ok(PostedDiscussion {
            show_set: stored,
            item,
            uploads,
        })
    }

    // ------------------------------------------------------------------
    // Store access and side effects
    // ------------------------------------------------------------------

    async fn load(&self, id: &str) -> Result<ShowSet, WorkflowError> {
        self.store
            .get(&ShowSetId::new(id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("showset {id}")))
    }

    /// Writes the difference between `before` and `after` conditioned on the
    /// revision that was read.
    async fn commit(&self, before: &ShowSet, after: &ShowSet) -> Result<ShowSet, WorkflowError> {
        let patch = ShowSetPatch::between(before, after);
        if patch.is_empty() {
            return Ok(before.clone());
        }
        match self.store.update(&before.id, before.revision, &patch).await {
            Ok(stored) => Ok(stored),
            Err(err) => {
                let err = WorkflowError::from(err);
                if err.is_retryable() {
                    workflow_metrics().record_conflict();
                    warn!(
                        show_set_id = %before.id,
                        expected_revision = before.revision,
                        "Conditional write lost a race"
                    );
                }
                Err(err)
            }
        }
    }

    async fn record_activity(&self, records: Vec<ActivityRecord>) {
        for record in records {
            let kind = record.kind;
            if let Err(e) = self.activity.append(record).await {
                warn!(kind = ?kind, error = %e, "Failed to append activity record");
                workflow_metrics().record_side_effect_failure("activity");
            }
        }
    }

    async fn request_translation(&self, show_set_id: &ShowSetId, item: &DiscussionItem) {
        let job = TranslationJob::for_item(show_set_id, item);
        if let Err(e) = self.translations.enqueue(job).await {
            warn!(note_id = %item.id, error = %e, "Failed to enqueue translation job");
            workflow_metrics().record_side_effect_failure("translation");
        }
    }

    async fn issue_upload(&self, attachment: &AttachmentRef) -> Option<UploadHandle> {
        match self
            .uploads
            .request_upload(
                &self.settings.attachment_bucket,
                &attachment.key,
                &attachment.mime_type,
                attachment.size_bytes,
            )
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(key = %attachment.key, error = %e, "Failed to issue upload handle");
                workflow_metrics().record_side_effect_failure("uploads");
                None
            }
        }
    }
}

fn bump_record(
    show_set_id: &ShowSetId,
    actor: &Actor,
    stage: StageName,
    bump: &VersionBump,
    trigger: &VersionTrigger,
    now: DateTime<Utc>,
) -> ActivityRecord {
    ActivityRecord::new(
        show_set_id,
        actor,
        ActivityKind::VersionBumped,
        json!({
            "stage": stage,
            "deliverable": bump.deliverable,
            "from": bump.from,
            "to": bump.to,
            "trigger": trigger,
            "history_id": bump.history_id,
        }),
        now,
    )
}

/// Activity records for one committed transition, in emission order.
fn transition_records(
    show_set_id: &ShowSetId,
    actor: &Actor,
    outcome: &TransitionOutcome,
    now: DateTime<Utc>,
) -> Vec<ActivityRecord> {
    let stage = outcome.stage;
    let mut records = Vec::new();

    if outcome.status_changed() {
        records.push(ActivityRecord::new(
            show_set_id,
            actor,
            ActivityKind::StatusChanged,
            json!({
                "stage": stage,
                "from": outcome.before.status,
                "to": outcome.after.status,
                "note_id": outcome.note.as_ref().map(|n| n.id),
            }),
            now,
        ));
    }
    if outcome.assignee_changed() {
        records.push(ActivityRecord::new(
            show_set_id,
            actor,
            ActivityKind::AssigneeChanged,
            json!({
                "stage": stage,
                "from": outcome.before.assignee,
                "to": outcome.after.assignee,
            }),
            now,
        ));
    }
    if outcome.version_label_changed() {
        records.push(ActivityRecord::new(
            show_set_id,
            actor,
            ActivityKind::VersionLabelChanged,
            json!({
                "stage": stage,
                "from": outcome.before.version_label,
                "to": outcome.after.version_label,
            }),
            now,
        ));
    }
    if let Some(bump) = &outcome.bump {
        records.push(bump_record(
            show_set_id,
            actor,
            stage,
            bump,
            &VersionTrigger::Rework { stage },
            now,
        ));
    }
    if !outcome.cascade.is_empty() {
        records.push(ActivityRecord::new(
            show_set_id,
            actor,
            ActivityKind::CascadeReset,
            json!({
                "trigger_stage": stage,
                "reset": outcome.cascade.resets,
                "bumps": outcome.cascade.bumps,
            }),
            now,
        ));
    }
    records
}
