//! agent-runtime CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agent_runtime::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config is reported by the command itself, after logging is up
    let debug = cli.debug || cli.load_config().map(|c| c.debug).unwrap_or(false);
    let default_level = if debug { "debug" } else { "info" };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    cli.execute().await
}
