//! Process-wide shared client.
//!
//! Most code should construct a [`GatewayClient`] and pass it around. Call
//! sites that cannot be threaded through use this accessor; it keeps one
//! instance per endpoint and credential.

use crate::client::GatewayClient;
use crate::Result;
use gatelink_core::ClientConfig;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

static SHARED: Lazy<Mutex<Option<Arc<GatewayClient>>>> = Lazy::new(|| Mutex::new(None));

/// Return the shared client for `config`.
///
/// The existing instance is reused when its endpoint and credential match.
/// Otherwise it is disconnected before the replacement is constructed, so
/// no pending request or reconnect timer outlives it. The returned client
/// is not connected automatically.
pub fn install(config: ClientConfig) -> Result<Arc<GatewayClient>> {
    let mut slot = SHARED.lock();

    if let Some(existing) = slot.as_ref() {
        if existing.matches(&config.gateway) {
            return Ok(Arc::clone(existing));
        }
    }

    if let Some(previous) = slot.take() {
        info!(url = %previous.endpoint().url, "Replacing shared gateway client");
        previous.disconnect();
    }

    let client = Arc::new(GatewayClient::new(config)?);
    *slot = Some(Arc::clone(&client));
    Ok(client)
}

/// The shared client, if one is installed.
pub fn current() -> Option<Arc<GatewayClient>> {
    SHARED.lock().clone()
}

/// Disconnect and remove the shared client.
pub fn reset() {
    if let Some(previous) = SHARED.lock().take() {
        previous.disconnect();
    }
}
