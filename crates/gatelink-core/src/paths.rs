//! Path resolution utilities.

use crate::env;
use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the Gatelink base directory (`$GATELINK_HOME` or ~/.gatelink).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = env::get_var(env::vars::GATELINK_HOME) {
        return Ok(expand_tilde(&home));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
    Ok(home.join(".gatelink"))
}

/// Get the main config file path (~/.gatelink/gatelink.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    if let Some(path) = env::get_var(env::vars::GATELINK_CONFIG) {
        return Ok(expand_tilde(&path));
    }
    Ok(base_dir()?.join("gatelink.json5"))
}

/// Get the REPL history file path (~/.gatelink/history).
pub fn history_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("history"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
