use anyhow::Result;
use clap::Parser;
use tracing::Instrument;

use showset_workflow::cli::{commands, Cli};
use showset_workflow::config::{config, WorkflowConfig};
use showset_workflow::observability::workflow_metrics;
use showset_workflow::telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env before the global configuration reads the environment
    let _ = WorkflowConfig::load_env_file();
    let config = config()?;
    init_telemetry(&config.observability)?;

    let correlation_id = generate_correlation_id();
    let span = create_workflow_span(
        cli.command.name(),
        cli.command.show_set_id(),
        Some(&cli.actor.actor_id),
        Some(&correlation_id),
    );

    let result = commands::run(cli, config).instrument(span).await;
    workflow_metrics().log_stats();
    result
}
