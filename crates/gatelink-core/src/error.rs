//! Errors raised while locating, reading, or validating client configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Everything that can go wrong before a client is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the resolved config path.
    #[error("no config file at {0}")]
    NotFound(PathBuf),

    /// The file exists but is not valid JSON5 for [`ClientConfig`](crate::ClientConfig).
    #[error("malformed config: {0}")]
    Malformed(String),

    /// The config could not be rendered back to text.
    #[error("could not serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    /// One or more fields failed validation; messages are joined with `; `.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// Neither `$GATELINK_HOME` nor a home directory is available.
    #[error("cannot locate the gatelink home directory")]
    NoHome,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// True when the error means "nothing there yet" rather than "something broken".
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::NotFound(_))
    }
}
