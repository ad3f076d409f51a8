use anyhow::Result;
use clap::Args;

use super::{print_json, WorkflowContext};
use crate::showset::{Area, FieldUpdate, Language, LocalizedText};
use crate::workflow::{LinksUpdate, NewShowSet};

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub id: String,

    #[arg(long, help = "interior or exterior")]
    pub area: Area,

    #[arg(long)]
    pub scene: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Language of the description
    #[arg(long, default_value = "en")]
    pub language: Language,

    /// Related item references, repeatable
    #[arg(long = "related")]
    pub related_items: Vec<String>,
}

impl CreateArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let request = NewShowSet {
            id: self.id.clone(),
            area: self.area,
            scene: self.scene.clone(),
            description: self
                .description
                .as_ref()
                .map(|text| LocalizedText::from_source(self.language, text.clone()))
                .unwrap_or_default(),
            related_items: self.related_items.clone(),
        };
        let show_set = ctx
            .orchestrator
            .create_show_set(&ctx.actor, request)
            .await?;
        print_json(&show_set)
    }
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub id: String,
}

impl ShowArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let show_set = ctx.orchestrator.get_show_set(&self.id).await?;
        print_json(&serde_json::json!({
            "locked": ctx.orchestrator.is_locked(&show_set),
            "show_set": show_set,
        }))
    }
}

pub async fn list(ctx: &WorkflowContext) -> Result<()> {
    let summaries: Vec<_> = ctx
        .orchestrator
        .list_show_sets()
        .await?
        .into_iter()
        .map(|show_set| {
            let stages: serde_json::Map<String, serde_json::Value> = show_set
                .stages
                .iter()
                .map(|(name, stage)| (name.to_string(), serde_json::json!(stage.status)))
                .collect();
            serde_json::json!({
                "id": show_set.id,
                "area": show_set.area,
                "scene": show_set.scene,
                "locked": ctx.orchestrator.is_locked(&show_set),
                "stages": stages,
            })
        })
        .collect();
    print_json(&summaries)
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: String,
}

impl DeleteArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        ctx.orchestrator
            .delete_show_set(&ctx.actor, &self.id)
            .await?;
        print_json(&serde_json::json!({ "deleted": self.id }))
    }
}

/// Pass an empty string to clear a link
#[derive(Args, Debug)]
pub struct LinksArgs {
    pub id: String,

    #[arg(long)]
    pub model_viewer: Option<String>,

    #[arg(long)]
    pub bim360: Option<String>,

    #[arg(long)]
    pub drawing_set: Option<String>,

    #[arg(long)]
    pub reference_folder: Option<String>,
}

fn link_update(value: &Option<String>) -> FieldUpdate<String> {
    match value.as_deref().map(str::trim) {
        None => FieldUpdate::Keep,
        Some("") => FieldUpdate::Clear,
        Some(url) => FieldUpdate::Set(url.to_string()),
    }
}

impl LinksArgs {
    pub async fn execute(&self, ctx: &WorkflowContext) -> Result<()> {
        let update = LinksUpdate {
            model_viewer: link_update(&self.model_viewer),
            bim360: link_update(&self.bim360),
            drawing_set: link_update(&self.drawing_set),
            reference_folder: link_update(&self.reference_folder),
        };
        let show_set = ctx
            .orchestrator
            .update_links(&ctx.actor, &self.id, update)
            .await?;
        print_json(&show_set.links)
    }
}
