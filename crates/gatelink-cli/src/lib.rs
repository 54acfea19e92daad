//! Gatelink command-line interface.

pub mod commands;
pub mod render;
pub mod repl;

use clap::{Parser, Subcommand};
use gatelink_core::{ClientConfig, SecretString};
use std::path::PathBuf;

/// Gatelink - terminal client for the Gateway
#[derive(Parser)]
#[command(name = "gatelink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true, env = "GATELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Gateway WebSocket URL (overrides config)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Bearer token (overrides config)
    #[arg(long, global = true, env = "GATELINK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Issue one request and print the result
    Call(commands::call::CallArgs),

    /// Send a chat message and render the streamed reply
    Send(commands::chat::SendArgs),

    /// Show a session's message history
    History(commands::chat::HistoryArgs),

    /// Abort the in-progress reply for a session
    Abort(commands::chat::AbortArgs),

    /// Tail gateway events
    Watch(commands::watch::WatchArgs),

    /// Interactive chat session
    Chat(commands::chat::ChatArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Connection settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub url: Option<String>,
    pub token: Option<String>,
}

impl Overrides {
    /// Resolve the effective configuration: file (or defaults), then
    /// environment, then these flags.
    pub fn load(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::resolve(self.config.as_deref())?;
        if let Some(url) = &self.url {
            config.gateway.url = url.clone();
        }
        if let Some(token) = &self.token {
            config.gateway.token = Some(SecretString::new(token.clone()));
        }
        config.validate()?;
        Ok(config)
    }
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        config: cli.config,
        url: cli.url,
        token: cli.token,
    };

    match cli.command {
        Commands::Call(args) => commands::call::run(args, &overrides).await,
        Commands::Send(args) => commands::chat::send(args, &overrides).await,
        Commands::History(args) => commands::chat::history(args, &overrides).await,
        Commands::Abort(args) => commands::chat::abort(args, &overrides).await,
        Commands::Watch(args) => commands::watch::run(args, &overrides).await,
        Commands::Chat(args) => commands::chat::interactive(args, &overrides).await,
        Commands::Config(args) => commands::config::run(args, &overrides).await,
        Commands::Version => {
            println!("gatelink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
