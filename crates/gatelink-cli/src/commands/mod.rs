//! CLI command implementations.

pub mod call;
pub mod chat;
pub mod config;
pub mod watch;

use anyhow::bail;
use gatelink_client::GatewayClient;
use gatelink_core::ClientConfig;
use std::time::Duration;
use tracing::warn;

/// How long commands wait for the socket before giving up (or falling back).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a client and wait for the socket. When the socket cannot be
/// opened and an HTTP fallback is configured, the client is returned
/// anyway and calls take the fallback path.
pub async fn connect(config: ClientConfig) -> anyhow::Result<GatewayClient> {
    let url = config.gateway.url.clone();
    let has_fallback = config.gateway.http_url.is_some();

    let client = GatewayClient::new(config)?;
    client.connect();

    match tokio::time::timeout(CONNECT_TIMEOUT, client.wait_connected()).await {
        Ok(Ok(())) => Ok(client),
        _ if has_fallback => {
            warn!(url = %url, "Gateway socket unavailable; using HTTP fallback");
            Ok(client)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => bail!("Timed out connecting to {}", url),
    }
}

/// The session to use: the flag, else the configured default.
pub fn session_or_default(session: Option<String>, config: &ClientConfig) -> String {
    session.unwrap_or_else(|| config.events.session_key.clone())
}
