use anyhow::Result;
use clap::Args;
use serde_json::json;
use uuid::Uuid;

use super::{print_json, WorkflowContext};
use crate::showset::Language;
use crate::workflow::{DiscussionPost, DiscussionThread, RevisionNoteInput};

#[derive(Args, Debug)]
pub struct PostArgs {
    pub id: String,

    pub stage: String,

    pub text: String,

    /// Open a threaded issue instead of a flat note
    #[arg(long, conflicts_with = "reply_to")]
    pub issue: bool,

    /// Reply to an existing issue
    #[arg(long)]
    pub reply_to: Option<Uuid>,

    #[arg(long, default_value = "en")]
    pub language: Language,
}

impl PostArgs {
    pub fn thread(&self) -> DiscussionThread {
        match (self.reply_to, self.issue) {
            (Some(parent_id), _) => DiscussionThread::Reply { parent_id },
            (None, true) => DiscussionThread::Issue,
            (None, false) => DiscussionThread::Note,
        }
    }

    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let post = DiscussionPost {
            stage: self.stage.clone(),
            thread: self.thread(),
            body: RevisionNoteInput::new(self.text.clone(), self.language),
            attachments: Vec::new(),
        };
        let posted = ctx
            .orchestrator
            .add_discussion_item(&ctx.actor, &self.id, post)
            .await?;
        print_json(&json!({
            "item": posted.item,
            "uploads": posted.uploads,
        }))
    }
}
