//! Configuration schema definitions.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default gateway WebSocket endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789/ws";

/// Default session key consumers bind to.
pub const DEFAULT_SESSION_KEY: &str = "default";

/// Main Gatelink client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway endpoint and credential.
    #[serde(default)]
    pub gateway: GatewayEndpoint,

    /// Request correlation settings.
    #[serde(default)]
    pub requests: RequestConfig,

    /// Reconnect backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Event consumption settings.
    #[serde(default)]
    pub events: EventsConfig,
}

/// Where the gateway lives and how to authenticate to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEndpoint {
    /// WebSocket endpoint (`ws://` or `wss://`).
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Bearer credential, attached to the connection handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,

    /// Stateless request/response endpoint used while the socket is down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
}

impl Default for GatewayEndpoint {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            token: None,
            http_url: None,
        }
    }
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

/// Request correlation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RequestConfig {
    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry, doubled on each attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on the delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Event consumption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Session key stream consumers bind to when none is given.
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            session_key: default_session_key(),
        }
    }
}

fn default_session_key() -> String {
    DEFAULT_SESSION_KEY.to_string()
}
