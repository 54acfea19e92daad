//! Configuration management commands.

use crate::Overrides;
use clap::Args;
use gatelink_core::config::ClientConfig;
use gatelink_core::paths;
use serde_json::Value;
use std::path::PathBuf;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (token redacted)
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// Config file path: `--config`, else the default location.
fn config_path(overrides: &Overrides) -> anyhow::Result<PathBuf> {
    match &overrides.config {
        Some(path) => Ok(path.clone()),
        None => Ok(paths::config_file()?),
    }
}

/// Serialize the configuration for display, replacing the token with its
/// redacted hint.
pub fn redacted(config: &ClientConfig) -> anyhow::Result<Value> {
    let mut json = serde_json::to_value(config)?;
    if let Some(token) = &config.gateway.token {
        json["gateway"]["token"] = Value::String(token.hint());
    }
    Ok(json)
}

/// Write a default configuration to `path`, refusing to overwrite unless
/// `force` is set.
pub fn init_at(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {:?}. Use --force to overwrite.",
            path
        );
    }
    ClientConfig::default().save(path)?;
    Ok(())
}

/// Run the config command.
pub async fn run(args: ConfigArgs, overrides: &Overrides) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = overrides.load()?;
            println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
        }

        ConfigCommand::Path => {
            println!("{}", config_path(overrides)?.display());
        }

        ConfigCommand::Init { force } => {
            let path = config_path(overrides)?;
            init_at(&path, force)?;
            println!("Created config file: {:?}", path);
        }
    }

    Ok(())
}
