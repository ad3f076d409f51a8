use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{Cli, Commands};
use crate::config::{StoreBackend, WorkflowConfig};
use crate::permissions::{Actor, StaticPermissionResolver};
use crate::store::{FileShowSetStore, InMemoryShowSetStore, ShowSetStore};
use crate::workflow::{
    ActivitySink, InMemoryActivitySink, JsonLinesActivitySink, LocalUploadSigner,
    LoggingTranslationQueue, WorkflowOrchestrator,
};

pub mod discuss;
pub mod lock;
pub mod showset;
pub mod stage;
pub mod version;

/// Everything a command needs to run
pub struct WorkflowContext {
    pub orchestrator: WorkflowOrchestrator,
    pub actor: Actor,
}

/// Wires an orchestrator from configuration.
///
/// The file backend keeps its activity log next to the ShowSet documents.
pub async fn build_orchestrator(
    config: &WorkflowConfig,
    store_dir: Option<PathBuf>,
) -> Result<WorkflowOrchestrator> {
    config.validate()?;
    let directory = store_dir.unwrap_or_else(|| config.store.directory.clone());
    let (store, activity): (Arc<dyn ShowSetStore>, Arc<dyn ActivitySink>) =
        match config.store.backend {
            StoreBackend::File => {
                let store = FileShowSetStore::open(&directory)
                    .await
                    .with_context(|| format!("opening store at {}", directory.display()))?;
                let activity = JsonLinesActivitySink::new(directory.join("activity.jsonl"));
                (Arc::new(store), Arc::new(activity))
            }
            StoreBackend::Memory => {
                tracing::warn!("Memory store selected; nothing will persist past this command");
                (
                    Arc::new(InMemoryShowSetStore::new()),
                    Arc::new(InMemoryActivitySink::new()),
                )
            }
        };

    let orchestrator = WorkflowOrchestrator::new(
        store,
        Arc::new(StaticPermissionResolver),
        activity,
        Arc::new(LoggingTranslationQueue),
        Arc::new(LocalUploadSigner::new(
            config.attachments.base_url.clone(),
            config.attachments.upload_expiry_seconds,
        )),
    )
    .with_cascade_policy(config.cascade_policy())
    .with_lock_policy(config.lock_policy())
    .with_settings(config.orchestrator_settings()?);

    tracing::debug!(
        cascade = orchestrator.cascade_policy(),
        lock = orchestrator.lock_policy(),
        directory = %directory.display(),
        "Orchestrator ready"
    );
    Ok(orchestrator)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(cli: Cli, config: &WorkflowConfig) -> Result<()> {
    let ctx = WorkflowContext {
        orchestrator: build_orchestrator(config, cli.store_dir.clone()).await?,
        actor: cli.actor.actor(),
    };

    match &cli.command {
        Commands::Create(args) => args.execute(&ctx).await,
        Commands::Show(args) => args.execute(&ctx).await,
        Commands::List => showset::list(&ctx).await,
        Commands::Delete(args) => args.execute(&ctx).await,
        Commands::Links(args) => args.execute(&ctx).await,
        Commands::Stage(args) => args.execute(&ctx).await,
        Commands::Revise(args) => args.execute(&ctx).await,
        Commands::Recall(args) => args.execute(&ctx).await,
        Commands::Lock(args) => args.execute(&ctx).await,
        Commands::Unlock(args) => args.execute(&ctx).await,
        Commands::SetVersion(args) => args.execute(&ctx).await,
        Commands::History(args) => args.execute(&ctx).await,
        Commands::Post(args) => args.execute(&ctx).await,
    }
}
