use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::{print_json, WorkflowContext};
use crate::showset::Language;
use crate::versioning::DeliverableType;
use crate::workflow::{RevisionNoteInput, SetVersionRequest, VersionEdit, VersionTarget};

#[derive(Args, Debug)]
pub struct SetVersionArgs {
    pub id: String,

    /// screen, structure, integrated, model or drawing2d
    pub deliverable: DeliverableType,

    /// Target version; omit to increment by one
    #[arg(long)]
    pub to: Option<u32>,

    #[arg(long)]
    pub reason: Option<String>,

    #[arg(long, default_value = "en")]
    pub language: Language,
}

impl SetVersionArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let request = SetVersionRequest {
            deliverable: self.deliverable,
            target: self
                .to
                .map(VersionTarget::Exact)
                .unwrap_or(VersionTarget::Increment),
            reason: self
                .reason
                .as_ref()
                .map(|text| RevisionNoteInput::new(text.clone(), self.language)),
        };

        match ctx
            .orchestrator
            .set_version(&ctx.actor, &self.id, request)
            .await?
        {
            VersionEdit::Unchanged { version, .. } => print_json(&json!({
                "changed": false,
                "deliverable": self.deliverable,
                "version": version,
            })),
            VersionEdit::Changed { bump, .. } => print_json(&json!({
                "changed": true,
                "bump": bump,
            })),
        }
    }
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    pub id: String,

    #[arg(long)]
    pub deliverable: Option<DeliverableType>,
}

impl HistoryArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let show_set = ctx.orchestrator.get_show_set(&self.id).await?;
        let history = ctx
            .orchestrator
            .version_history(&self.id, self.deliverable)
            .await?;
        print_json(&json!({
            "counters": show_set.versions.counters(),
            "history": history,
        }))
    }
}
