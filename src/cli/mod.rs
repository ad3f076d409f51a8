use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::permissions::{Actor, Role};

pub mod commands;

use commands::discuss::PostArgs;
use commands::lock::{LockArgs, UnlockArgs};
use commands::showset::{CreateArgs, DeleteArgs, LinksArgs, ShowArgs};
use commands::stage::{RecallArgs, ReviseArgs, StageArgs};
use commands::version::{HistoryArgs, SetVersionArgs};

#[derive(Parser, Debug)]
#[command(name = "showset-workflow")]
#[command(about = "Stage, version and lock workflow for ShowSets")]
#[command(long_about = "Moves ShowSets through the screen, structure, integrated, inBim360 and \
                       drawing2d stages against a local file store. Every command prints the \
                       resulting state as JSON.")]
pub struct Cli {
    #[command(flatten)]
    pub actor: ActorArgs,

    /// Store directory (overrides store.directory from configuration)
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Identity the command runs as
#[derive(Args, Debug, Clone)]
pub struct ActorArgs {
    #[arg(long, global = true, default_value = "cli")]
    pub actor_id: String,

    /// Display name recorded in the activity log (defaults to the id)
    #[arg(long, global = true)]
    pub actor_name: Option<String>,

    #[arg(long, global = true, default_value = "admin", help = "admin, manager, artist, bim_coordinator, engineer, client or viewer")]
    pub role: Role,

    /// Grant the individual right to edit version counters
    #[arg(long, global = true)]
    pub version_editor: bool,
}

impl ActorArgs {
    pub fn actor(&self) -> Actor {
        let name = self.actor_name.clone().unwrap_or_else(|| self.actor_id.clone());
        Actor::new(self.actor_id.clone(), name, self.role).with_version_editor(self.version_editor)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a ShowSet with every stage not_started
    Create(CreateArgs),
    /// Print one ShowSet
    Show(ShowArgs),
    /// List every ShowSet in the store
    List,
    /// Delete a ShowSet
    Delete(DeleteArgs),
    /// Set or clear external links
    Links(LinksArgs),
    /// Move one stage to a new status
    Stage(StageArgs),
    /// Flag upstream stages for revision while working a later stage
    Revise(ReviseArgs),
    /// Pull a stage under review back to an earlier stage
    Recall(RecallArgs),
    /// Lock a ShowSet against new in_progress work
    Lock(LockArgs),
    /// Release a ShowSet lock
    Unlock(UnlockArgs),
    /// Set a deliverable's version counter
    SetVersion(SetVersionArgs),
    /// Show version history
    History(HistoryArgs),
    /// Post a note, issue or reply to a stage's discussion
    Post(PostArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Create(_) => "create",
            Commands::Show(_) => "show",
            Commands::List => "list",
            Commands::Delete(_) => "delete",
            Commands::Links(_) => "links",
            Commands::Stage(_) => "stage",
            Commands::Revise(_) => "revise",
            Commands::Recall(_) => "recall",
            Commands::Lock(_) => "lock",
            Commands::Unlock(_) => "unlock",
            Commands::SetVersion(_) => "set-version",
            Commands::History(_) => "history",
            Commands::Post(_) => "post",
        }
    }

    /// The ShowSet the command targets, if any.
    pub fn show_set_id(&self) -> Option<&str> {
        match self {
            Commands::Create(args) => Some(&args.id),
            Commands::Show(args) => Some(&args.id),
            Commands::List => None,
            Commands::Delete(args) => Some(&args.id),
            Commands::Links(args) => Some(&args.id),
            Commands::Stage(args) => Some(&args.id),
            Commands::Revise(args) => Some(&args.id),
            Commands::Recall(args) => Some(&args.id),
            Commands::Lock(args) => Some(&args.id),
            Commands::Unlock(args) => Some(&args.id),
            Commands::SetVersion(args) => Some(&args.id),
            Commands::History(args) => Some(&args.id),
            Commands::Post(args) => Some(&args.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_stage_command_with_actor() {
        let cli = Cli::try_parse_from([
            "showset-workflow",
            "--actor-id",
            "e1",
            "--role",
            "engineer",
            "stage",
            "AB-101",
            "structure",
            "complete",
        ])
        .unwrap();
        assert_eq!(cli.command.name(), "stage");
        assert_eq!(cli.command.show_set_id(), Some("AB-101"));
        let actor = cli.actor.actor();
        assert_eq!(actor.role, Role::Engineer);
        assert_eq!(actor.name, "e1");
        assert!(!actor.version_editor);
    }

    #[test]
    fn test_rejects_unknown_role() {
        assert!(Cli::try_parse_from(["showset-workflow", "--role", "owner", "list"]).is_err());
    }
}
