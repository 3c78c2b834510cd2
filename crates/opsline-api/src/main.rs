//! Opsline CLI entry point.

mod cli;
mod runtime;
mod state;

use clap::Parser;

use cli::pipeline::PipelineCommand;
use cli::{Cli, Commands};
use opsline_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_filter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(verbosity_filter(cli.verbose), cli.otel) {
        eprintln!("warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;

    // Validation reads a file and touches no state.
    if let Commands::Pipeline {
        action: PipelineCommand::Validate { file },
    } = &cli.command
    {
        return cli::pipeline::handle_validate(file, json);
    }

    let state = state::AppState::init().await?;

    match cli.command {
        Commands::Pipeline { action } => {
            cli::pipeline::handle_pipeline_command(action, &state, json).await
        }
        Commands::Request { action } => {
            cli::request::handle_request_command(action, &state, json).await
        }
    }
}
