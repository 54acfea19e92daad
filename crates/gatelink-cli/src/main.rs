//! Gatelink CLI entry point.

use clap::Parser;
use gatelink_cli::{run, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap's env-backed flags can see it
    let dotenv = gatelink_core::env::load_dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging; stdout stays reserved for command output
    let default_filter = match cli.verbose {
        0 => "gatelink=info",
        1 => "gatelink=debug",
        _ => "gatelink=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = dotenv {
        tracing::warn!(error = %e, "Ignoring unreadable .env file");
    }

    // Run the command
    run(cli).await
}
