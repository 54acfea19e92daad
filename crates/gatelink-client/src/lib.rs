//! WebSocket client for the Gateway control plane.
//!
//! This crate provides:
//! - A connection state machine with bearer-authenticated handshakes and
//!   exponential-backoff reconnects
//! - Request/response correlation over the shared socket, with timeouts
//! - Topic-based event fan-out with wildcard and filtered subscriptions
//! - Accumulation of streamed assistant deltas into render-ready messages
//! - A facade ([`GatewayClient`]) and a process-wide shared instance

pub mod backoff;
pub mod client;
pub mod connection;
pub mod correlator;
pub mod delta;
pub mod error;
pub mod events;
pub mod fallback;
pub mod protocol;
pub mod shared;
pub mod stream;

pub use backoff::ReconnectPolicy;
pub use client::{methods, CallPath, GatewayClient, HistoryEntry, Routed};
pub use connection::{Connection, ConnectionState};
pub use correlator::Correlator;
pub use delta::{EndReason, StreamSignal};
pub use error::ClientError;
pub use events::{
    handler, Event, EventBus, EventKind, EventStream, Handler, HandlerId, TopicFilter,
    TOPIC_ANY, TOPIC_STATE, TOPIC_UNRECOGNIZED,
};
pub use fallback::{FallbackTransport, HttpFallback};
pub use protocol::{Inbound, RemoteError, Request, Response};
pub use stream::{ChatMessage, ContentBlock, SessionStream, StreamAccumulator, StreamUpdate, StreamView};

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
