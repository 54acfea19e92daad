//! WebSocket connection state machine.
//!
//! One driver task owns the socket. It opens the transport, pumps inbound
//! frames into the correlator and event bus, drains the outbound queue, and
//! on any close schedules the next attempt with exponential backoff.
//! [`Connection::disconnect`] retires the instance for good.

use crate::backoff::ReconnectPolicy;
use crate::correlator::Correlator;
use crate::error::ClientError;
use crate::events::{Event, EventBus};
use crate::protocol::{self, Inbound, Request};
use futures::{SinkExt, StreamExt};
use gatelink_core::{ClientConfig, SecretString};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as HandshakeRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of the gateway link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// Wire name, as published on the state topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "reconnecting" => Ok(Self::Reconnecting),
            other => Err(format!("unknown connection state: {}", other)),
        }
    }
}

struct StateCell {
    current: ConnectionState,
    retired: bool,
    /// Transitions not yet published, in the order they were applied.
    unpublished: VecDeque<ConnectionState>,
    /// Set while some caller is draining `unpublished`.
    publishing: bool,
}

struct Shared {
    url: Url,
    token: Option<SecretString>,
    policy: ReconnectPolicy,
    bus: EventBus,
    correlator: Correlator,
    state: Mutex<StateCell>,
    state_tx: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Owner of the gateway socket.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Create a connection for the configured endpoint. Nothing is opened
    /// until [`connect`](Self::connect).
    pub fn new(config: &ClientConfig, bus: EventBus) -> Result<Self, ClientError> {
        let url = parse_endpoint(&config.gateway.url)?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Shared {
            url,
            token: config.gateway.token.clone(),
            policy: ReconnectPolicy::from_config(&config.reconnect),
            bus,
            correlator: Correlator::new(config.requests.timeout()),
            state: Mutex::new(StateCell {
                current: ConnectionState::Disconnected,
                retired: false,
                unpublished: VecDeque::new(),
                publishing: false,
            }),
            state_tx,
            attempts: AtomicU32::new(0),
            outbound: Mutex::new(None),
            driver: Mutex::new(None),
            shutdown: CancellationToken::new(),
        };

        // Surface a credential that cannot form a header now rather than on
        // every reconnect.
        shared.handshake()?;

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Start the driver task and return immediately. Progress is observable
    /// through state events. Ignored after [`disconnect`](Self::disconnect)
    /// or while a driver is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if self.is_retired() {
            debug!("Ignoring connect on a retired connection");
            return;
        }
        if self.driver_running() {
            return;
        }

        info!(url = %self.shared.url, "Connecting to gateway");
        // Published with no lock held so state handlers may call back in.
        self.shared.transition(ConnectionState::Connecting);

        let mut driver = self.shared.driver.lock();
        let running = driver.as_ref().is_some_and(|handle| !handle.is_finished());
        if running || self.is_retired() {
            return;
        }
        *driver = Some(tokio::spawn(drive(Arc::clone(&self.shared))));
    }

    fn driver_running(&self) -> bool {
        self.shared
            .driver
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Tear down the link permanently.
    ///
    /// Every pending request is rejected with
    /// [`ClientError::ConnectionClosed`], any scheduled reconnect is
    /// cancelled, and the state ends at `disconnected`. Idempotent.
    pub fn disconnect(&self) {
        let first = {
            let mut cell = self.shared.state.lock();
            !std::mem::replace(&mut cell.retired, true)
        };

        self.shared.shutdown.cancel();
        // The driver observes the cancellation and sends a close frame.
        drop(self.shared.driver.lock().take());
        let rejected = self.shared.teardown();

        if first {
            info!(rejected, "Disconnected from gateway");
        }
    }

    /// Issue a correlated request. Fails with [`ClientError::NotConnected`]
    /// without registering anything unless the link is `connected`.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        if !self.state().is_connected() {
            return Err(ClientError::NotConnected);
        }

        let correlator = &self.shared.correlator;
        let (id, reply) = correlator.register(method);

        let mut request = Request::new(id.clone(), method);
        request.params = params;
        let frame = match request.encode() {
            Ok(frame) => frame,
            Err(e) => {
                correlator.reject(&id, ClientError::ConnectionClosed);
                return Err(e);
            }
        };

        let sent = match self.shared.outbound.lock().as_ref() {
            Some(tx) => tx.send(Message::Text(frame)).is_ok(),
            None => false,
        };
        if !sent {
            correlator.reject(&id, ClientError::ConnectionClosed);
        } else {
            trace!(id = %id, method, "Request sent");
        }

        reply.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().current
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Whether [`disconnect`](Self::disconnect) has been called.
    pub fn is_retired(&self) -> bool {
        self.shared.state.lock().retired
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Requests still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// The configured endpoint (without credential).
    pub fn url(&self) -> &Url {
        &self.shared.url
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.shared.url.as_str())
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

impl Shared {
    /// Move to `next`, publishing one state event if the state changed.
    /// A retired connection only ever moves to `disconnected`.
    ///
    /// State events are published in exactly the order the transitions were
    /// applied. Whichever caller finds nobody publishing drains the queue;
    /// concurrent or re-entrant callers only enqueue. Handlers run with no
    /// lock held.
    fn transition(&self, next: ConnectionState) -> bool {
        {
            let mut cell = self.state.lock();
            if cell.retired && next != ConnectionState::Disconnected {
                return false;
            }
            if cell.current == next {
                return false;
            }
            cell.current = next;
            self.state_tx.send_replace(next);
            cell.unpublished.push_back(next);
            if cell.publishing {
                return true;
            }
            cell.publishing = true;
        }

        loop {
            let state = {
                let mut cell = self.state.lock();
                match cell.unpublished.pop_front() {
                    Some(state) => state,
                    None => {
                        cell.publishing = false;
                        break;
                    }
                }
            };
            debug!(state = %state, "Connection state changed");
            self.bus.emit(Event::state_changed(state));
        }
        true
    }

    /// Drop the outbound queue, settle every pending request and fall back
    /// to `disconnected`. Returns how many requests were rejected.
    fn teardown(&self) -> usize {
        self.outbound.lock().take();
        let rejected = self.correlator.reject_all();
        self.transition(ConnectionState::Disconnected);
        rejected
    }

    /// Build the handshake: the credential rides both as a `token` query
    /// parameter and as a bearer `Authorization` header.
    fn handshake(&self) -> Result<HandshakeRequest, ClientError> {
        let mut url = self.url.clone();
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("token", token.expose_secret());
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| ClientError::InvalidEndpoint("token is not a valid header value".into()))?;
            request.headers_mut().insert("Authorization", value);
        }

        Ok(request)
    }

    async fn open(&self) -> Option<Result<Socket, ClientError>> {
        let request = match self.handshake() {
            Ok(request) => request,
            Err(e) => return Some(Err(e)),
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = tokio_tungstenite::connect_async(request) => Some(
                result
                    .map(|(socket, _)| socket)
                    .map_err(|e| ClientError::WebSocket(e.to_string())),
            ),
        }
    }

    /// Pump one open socket until it closes or shutdown is requested.
    async fn run_session(&self, socket: Socket) {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock() = Some(tx);
        self.transition(ConnectionState::Connected);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                Some(message) = rx.recv() => {
                    if let Err(e) = sink.send(message).await {
                        warn!(error = %e, "Failed to write to gateway socket");
                        break;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.dispatch(&text),
                        Err(_) => warn!("Discarding non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Gateway closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Gateway socket error");
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    /// Route one inbound frame: responses to the correlator, events to the
    /// bus, anything else to the diagnostic topic.
    fn dispatch(&self, text: &str) {
        match protocol::decode(text) {
            Inbound::Response(response) => {
                self.correlator.resolve(response);
            }
            Inbound::Event(event) => {
                trace!(topic = %event.topic, "Event received");
                self.bus.emit(event);
            }
            Inbound::Unrecognized(frame) => {
                debug!(%frame, "Unrecognized frame");
                self.bus.emit(Event::unrecognized(frame));
            }
        }
    }
}

async fn drive(shared: Arc<Shared>) {
    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }
        if shared.attempts.load(Ordering::SeqCst) > 0 {
            shared.transition(ConnectionState::Reconnecting);
        } else {
            shared.transition(ConnectionState::Connecting);
        }

        match shared.open().await {
            None => break,
            Some(Ok(socket)) => {
                shared.attempts.store(0, Ordering::SeqCst);
                info!(url = %shared.url, "Connected to gateway");
                shared.run_session(socket).await;
            }
            Some(Err(e)) => {
                warn!(url = %shared.url, error = %e, "Gateway connection failed");
            }
        }

        shared.teardown();
        if shared.shutdown.is_cancelled() {
            break;
        }

        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = shared.policy.delay_for(attempt);
        shared.transition(ConnectionState::Reconnecting);
        info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Connection driver stopped");
}

fn parse_endpoint(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw).map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ClientError::InvalidEndpoint(format!(
            "unsupported scheme '{}' (expected ws or wss)",
            other
        ))),
    }
}
