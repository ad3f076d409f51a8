use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::{print_json, WorkflowContext};
use crate::workflow::UnlockRequest;

#[derive(Args, Debug)]
pub struct LockArgs {
    pub id: String,
}

impl LockArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let show_set = ctx
            .orchestrator
            .lock_show_set(&ctx.actor, &self.id)
            .await?;
        print_json(&json!({
            "locked": ctx.orchestrator.is_locked(&show_set),
            "lock": show_set.lock,
        }))
    }
}

#[derive(Args, Debug)]
pub struct UnlockArgs {
    pub id: String,

    /// Why the ShowSet is being reopened (required by the implicit lock policy)
    #[arg(long)]
    pub reason: Option<String>,

    /// Completed stage to send back to revision_required, repeatable
    #[arg(long = "reset")]
    pub reset_stages: Vec<String>,
}

impl UnlockArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let unlock = ctx
            .orchestrator
            .unlock_show_set(
                &ctx.actor,
                &self.id,
                UnlockRequest {
                    reason: self.reason.clone(),
                    reset_stages: self.reset_stages.clone(),
                },
            )
            .await?;
        print_json(&json!({
            "reset": unlock.resets,
            "last_unlock": unlock.show_set.last_unlock,
        }))
    }
}
