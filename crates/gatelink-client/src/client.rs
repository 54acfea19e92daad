//! Gateway client facade.
//!
//! [`GatewayClient`] composes the connection, the event bus and the
//! optional fallback transport, and exposes the domain RPCs consumers use.

use crate::connection::{Connection, ConnectionState};
use crate::error::ClientError;
use crate::events::{EventBus, EventStream, Handler, HandlerId, TopicFilter};
use crate::fallback::{FallbackTransport, HttpFallback};
use crate::stream::SessionStream;
use crate::Result;
use gatelink_core::config::GatewayEndpoint;
use gatelink_core::ClientConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Gateway method names used by the convenience wrappers.
pub mod methods {
    /// Send a chat message.
    pub const CHAT_SEND: &str = "chat";
    /// Fetch a session's message history.
    pub const CHAT_HISTORY: &str = "chat.history";
    /// Abort the in-progress response for a session.
    pub const CHAT_ABORT: &str = "chat.abort";
}

/// Which path carried a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPath {
    Socket,
    Fallback,
}

/// A call result tagged with the path it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub path: CallPath,
    pub value: Value,
}

/// Parameters for [`methods::CHAT_SEND`].
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageParams {
    pub message: String,
    pub session_key: String,
    pub stream: bool,
}

/// Parameters for [`methods::CHAT_HISTORY`].
#[derive(Debug, Clone, Serialize)]
pub struct HistoryParams {
    pub session_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Parameters for [`methods::CHAT_ABORT`].
#[derive(Debug, Clone, Serialize)]
pub struct AbortParams {
    pub session_key: String,
}

/// Client for one gateway endpoint.
pub struct GatewayClient {
    config: ClientConfig,
    bus: EventBus,
    connection: Connection,
    fallback: Option<Arc<dyn FallbackTransport>>,
}

impl GatewayClient {
    /// Create a client. The configuration is validated; nothing is opened
    /// until [`connect`](Self::connect). An HTTP fallback is set up when
    /// `gateway.http_url` is configured.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let bus = EventBus::new();
        let connection = Connection::new(&config, bus.clone())?;

        let fallback = match &config.gateway.http_url {
            Some(url) => {
                let http = HttpFallback::new(url.clone(), config.requests.timeout())?
                    .with_token(config.gateway.token.clone());
                Some(Arc::new(http) as Arc<dyn FallbackTransport>)
            }
            None => None,
        };

        Ok(Self {
            config,
            bus,
            connection,
            fallback,
        })
    }

    /// Replace the fallback transport.
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackTransport>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Start connecting. Returns immediately.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Tear down permanently, rejecting every pending request.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.connection.reconnect_attempts()
    }

    pub fn pending_requests(&self) -> usize {
        self.connection.pending_requests()
    }

    /// Wait until the link is `connected`. Fails with
    /// [`ClientError::ConnectionClosed`] if the client is disconnected.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut states = self.watch_state();
        loop {
            if self.connection.is_retired() {
                return Err(ClientError::ConnectionClosed);
            }
            if states.borrow_and_update().is_connected() {
                return Ok(());
            }
            states
                .changed()
                .await
                .map_err(|_| ClientError::ConnectionClosed)?;
        }
    }

    /// Issue a correlated request over the socket.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.connection.request(method, params).await
    }

    /// Typed variant of [`request`](Self::request).
    pub async fn request_as<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let value = self.request(method, Some(params)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Issue a call over the socket if connected, otherwise over the
    /// fallback. The path is chosen once; a failed call is never re-issued
    /// on the other path.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Routed> {
        if self.is_connected() {
            let value = self.request(method, params).await?;
            return Ok(Routed {
                path: CallPath::Socket,
                value,
            });
        }

        match &self.fallback {
            Some(fallback) => {
                debug!(method, transport = fallback.name(), "Socket down; using fallback");
                let value = fallback.call(method, params).await?;
                Ok(Routed {
                    path: CallPath::Fallback,
                    value,
                })
            }
            None => Err(ClientError::NotConnected),
        }
    }

    /// Send a chat message; the response streams back as events.
    pub async fn send_message(&self, session_key: &str, message: &str) -> Result<Value> {
        let params = SendMessageParams {
            message: message.to_string(),
            session_key: session_key.to_string(),
            stream: true,
        };
        self.call(methods::CHAT_SEND, Some(serde_json::to_value(params)?))
            .await
            .map(|routed| routed.value)
    }

    /// Fetch a session's history.
    pub async fn fetch_history(&self, session_key: &str, limit: Option<usize>) -> Result<Value> {
        let params = HistoryParams {
            session_key: session_key.to_string(),
            limit,
        };
        self.call(methods::CHAT_HISTORY, Some(serde_json::to_value(params)?))
            .await
            .map(|routed| routed.value)
    }

    /// Abort the in-progress response for a session.
    pub async fn abort(&self, session_key: &str) -> Result<Value> {
        let params = AbortParams {
            session_key: session_key.to_string(),
        };
        self.call(methods::CHAT_ABORT, Some(serde_json::to_value(params)?))
            .await
            .map(|routed| routed.value)
    }

    /// Register a handler for a topic.
    pub fn on(&self, topic: impl Into<String>, handler: Handler) -> HandlerId {
        self.bus.on(topic, handler)
    }

    /// Register a handler for every event.
    pub fn on_any(&self, handler: Handler) -> HandlerId {
        self.bus.on_any(handler)
    }

    /// Remove a handler registration.
    pub fn off(&self, id: HandlerId) -> bool {
        self.bus.off(id)
    }

    /// Async stream of events matching `filter`.
    pub fn subscribe(&self, filter: TopicFilter) -> EventStream {
        self.bus.subscribe(filter)
    }

    /// The client's event bus.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Attach a stream accumulator bound to `session_key`.
    pub fn stream_session(&self, session_key: impl Into<String>) -> SessionStream {
        SessionStream::attach(&self.bus, session_key)
    }

    /// Whether this client was built for `endpoint` (URL and credential).
    pub fn matches(&self, endpoint: &GatewayEndpoint) -> bool {
        self.config.gateway.url == endpoint.url && self.config.gateway.token == endpoint.token
    }

    pub fn endpoint(&self) -> &GatewayEndpoint {
        &self.config.gateway
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("url", &self.config.gateway.url)
            .field("state", &self.state())
            .field("fallback", &self.fallback.as_ref().map(|f| f.name().to_string()))
            .finish()
    }
}

/// A history entry as returned by [`methods::CHAT_HISTORY`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}
