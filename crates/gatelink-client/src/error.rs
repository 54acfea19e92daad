//! Client error types.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the gateway client.
///
/// Transport failures never appear here directly: the connection state
/// machine absorbs them and in-flight requests observe
/// [`ConnectionClosed`](ClientError::ConnectionClosed).
#[derive(Debug, Error)]
pub enum ClientError {
    /// A request was issued while the socket was not connected.
    #[error("Not connected to gateway")]
    NotConnected,

    /// The socket was torn down while the request was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No response arrived within the request timeout.
    #[error("Request '{method}' timed out after {}ms", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    /// The gateway answered with an error object.
    #[error("Gateway error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The configured endpoint cannot be used for a WebSocket handshake.
    #[error("Invalid gateway endpoint: {0}")]
    InvalidEndpoint(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The stateless fallback call failed.
    #[error("Fallback request failed: {0}")]
    Fallback(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] gatelink_core::ConfigError),
}

impl ClientError {
    /// Whether this is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the failure comes from connection loss and is expected to
    /// clear once the socket reconnects.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// The remote error code, if the gateway returned one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}
