use anyhow::{bail, Result};
use clap::Args;
use serde_json::json;

use super::{print_json, WorkflowContext};
use crate::showset::{FieldUpdate, Language, StageStatus};
use crate::workflow::{
    AttachmentDescriptor, RecallRequest, RevisionNoteInput, TransitionRequest,
    UpstreamRevisionRequest,
};

fn note_input(note: &Option<String>, language: Language) -> Option<RevisionNoteInput> {
    note.as_ref()
        .map(|text| RevisionNoteInput::new(text.clone(), language))
}

#[derive(Args, Debug)]
pub struct StageArgs {
    pub id: String,

    /// screen, structure, integrated, inBim360 or drawing2d
    pub stage: String,

    /// not_started, in_progress, on_hold, engineer_review, client_review, complete or revision_required
    pub status: StageStatus,

    #[arg(long, conflicts_with = "clear_assignee")]
    pub assignee: Option<String>,

    #[arg(long)]
    pub clear_assignee: bool,

    /// Free-text version label
    #[arg(long)]
    pub label: Option<String>,

    /// Revision note (required with revision_required)
    #[arg(long)]
    pub note: Option<String>,

    #[arg(long, default_value = "en")]
    pub language: Language,
}

impl StageArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let assignee = match (&self.assignee, self.clear_assignee) {
            (Some(name), _) => FieldUpdate::Set(name.clone()),
            (None, true) => FieldUpdate::Clear,
            (None, false) => FieldUpdate::Keep,
        };
        let label = self
            .label
            .clone()
            .map(FieldUpdate::Set)
            .unwrap_or_default();

        let mut request = TransitionRequest::new(self.stage.clone(), self.status)
            .with_assignee(assignee)
            .with_version_label(label);
        request.note = note_input(&self.note, self.language);

        let update = ctx
            .orchestrator
            .update_stage(&ctx.actor, &self.id, request)
            .await?;
        print_json(&json!({
            "stage": update.outcome.stage,
            "from": update.outcome.before.status,
            "to": update.outcome.after.status,
            "bump": update.outcome.bump,
            "cascade": update.outcome.cascade,
            "show_set": update.show_set,
        }))
    }
}

#[derive(Args, Debug)]
pub struct ReviseArgs {
    pub id: String,

    /// Stage currently being worked
    #[arg(long)]
    pub current: String,

    /// Upstream stage that needs rework, repeatable
    #[arg(long = "target", required = true)]
    pub targets: Vec<String>,

    #[arg(long)]
    pub note: String,

    #[arg(long, default_value = "en")]
    pub language: Language,

    /// File name of an attachment to upload
    #[arg(long, requires_all = ["mime_type", "size"])]
    pub attach: Option<String>,

    #[arg(long)]
    pub mime_type: Option<String>,

    /// Declared attachment size in bytes
    #[arg(long)]
    pub size: Option<u64>,
}

impl ReviseArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let attachment = match (&self.attach, &self.mime_type, self.size) {
            (Some(file_name), Some(mime_type), Some(size_bytes)) => Some(AttachmentDescriptor {
                file_name: file_name.clone(),
                mime_type: mime_type.clone(),
                size_bytes,
            }),
            (None, _, _) => None,
            _ => bail!("--attach needs --mime-type and --size"),
        };
        let request = UpstreamRevisionRequest {
            target_stages: self.targets.clone(),
            current_stage: self.current.clone(),
            note: RevisionNoteInput::new(self.note.clone(), self.language),
            attachment,
        };

        let revision = ctx
            .orchestrator
            .request_upstream_revision(&ctx.actor, &self.id, request)
            .await?;
        print_json(&json!({
            "flagged": revision.flagged,
            "reset": revision.resets,
            "note": revision.note,
            "upload": revision.upload,
            "show_set": revision.show_set,
        }))
    }
}

#[derive(Args, Debug)]
pub struct RecallArgs {
    pub id: String,

    /// Stage currently under review
    #[arg(long)]
    pub from: String,

    /// Stage to pull back to (may equal --from)
    #[arg(long = "to")]
    pub target: String,

    /// Start work on the target immediately instead of flagging it
    #[arg(long)]
    pub start: bool,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long, default_value = "en")]
    pub language: Language,
}

impl RecallArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let status = if self.start {
            StageStatus::InProgress
        } else {
            StageStatus::RevisionRequired
        };
        let request = RecallRequest {
            from: self.from.clone(),
            target: self.target.clone(),
            status,
            note: note_input(&self.note, self.language),
        };

        let recall = ctx
            .orchestrator
            .recall_from_review(&ctx.actor, &self.id, request)
            .await?;
        print_json(&json!({
            "bump": recall.bump,
            "reset": recall.resets,
            "note": recall.note,
            "show_set": recall.show_set,
        }))
    }
}
