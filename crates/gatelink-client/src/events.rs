//! Event multiplexing.
//!
//! Server-pushed events (and the client's own lifecycle notifications) are
//! published on named topics. Handlers register per topic, on the wildcard
//! topic [`TOPIC_ANY`], or behind an arbitrary predicate. A panicking handler
//! is isolated and logged; delivery to the remaining handlers continues.

use crate::connection::ConnectionState;
use crate::delta::{self, StreamSignal};
use futures::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Wildcard topic: receives every emitted event.
pub const TOPIC_ANY: &str = "*";

/// Connection state transitions. Payload is the new state name.
pub const TOPIC_STATE: &str = "connection.state";

/// Inbound frames that were neither a response nor an event.
pub const TOPIC_UNRECOGNIZED: &str = "protocol.unrecognized";

/// A published event. Serializes as the wire shape `{event, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic name.
    #[serde(rename = "event")]
    pub topic: String,

    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Create a new event.
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
        }
    }

    /// A connection state transition notification.
    pub fn state_changed(state: ConnectionState) -> Self {
        Self::new(TOPIC_STATE, Value::String(state.as_str().to_string()))
    }

    /// A diagnostic wrapper for a frame matching no known shape.
    pub fn unrecognized(frame: Value) -> Self {
        Self::new(TOPIC_UNRECOGNIZED, frame)
    }

    /// Classify the event.
    pub fn kind(&self) -> EventKind {
        match self.topic.as_str() {
            TOPIC_STATE => self
                .data
                .as_str()
                .and_then(|s| s.parse().ok())
                .map(EventKind::StateChanged)
                .unwrap_or(EventKind::Other),
            TOPIC_UNRECOGNIZED => EventKind::Unrecognized(self.data.clone()),
            _ => delta::normalize(self)
                .map(EventKind::Stream)
                .unwrap_or(EventKind::Other),
        }
    }
}

/// Typed view over an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// A streaming boundary or delta.
    Stream(StreamSignal),
    /// A frame that matched no envelope shape.
    Unrecognized(Value),
    /// Any other topic; consumers inspect `topic`/`data` directly.
    Other,
}

/// Event handler callback.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Identifies one registration; pass to [`EventBus::off`] to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Which events a subscription receives.
#[derive(Clone)]
pub enum TopicFilter {
    /// Every event (the wildcard topic).
    Any,
    /// Events on one topic.
    Topic(String),
    /// Events for which the predicate returns true.
    Matching(Predicate),
}

impl TopicFilter {
    /// Filter on a single topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self::Topic(topic.into())
    }

    /// Filter with a predicate.
    pub fn matching<F>(predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Self::Matching(Arc::new(predicate))
    }
}

impl std::fmt::Debug for TopicFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Topic(topic) => f.debug_tuple("Topic").field(topic).finish(),
            Self::Matching(_) => f.write_str("Matching(..)"),
        }
    }
}

#[derive(Default)]
struct Registry {
    /// Topic name (including the wildcard) to handlers in registration order.
    topics: HashMap<String, Vec<(HandlerId, Handler)>>,
    /// Predicate registrations in registration order.
    predicates: Vec<(HandlerId, Predicate, Handler)>,
}

struct BusInner {
    next_id: AtomicU64,
    registry: RwLock<Registry>,
}

/// Topic-based publish/subscribe fan-out.
///
/// Cheap to clone; clones share registrations.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a handler for a topic.
    ///
    /// Registering the same handler (same `Arc`) on the same topic again
    /// returns the existing id instead of adding a second registration.
    pub fn on(&self, topic: impl Into<String>, handler: Handler) -> HandlerId {
        let topic = topic.into();
        let mut registry = self.inner.registry.write();
        let handlers = registry.topics.entry(topic).or_default();

        if let Some((id, _)) = handlers.iter().find(|(_, h)| Arc::ptr_eq(h, &handler)) {
            return *id;
        }

        let id = self.next_id();
        handlers.push((id, handler));
        id
    }

    /// Register a handler on the wildcard topic.
    pub fn on_any(&self, handler: Handler) -> HandlerId {
        self.on(TOPIC_ANY, handler)
    }

    /// Register a handler behind a predicate.
    pub fn on_matching<F>(&self, predicate: F, handler: Handler) -> HandlerId
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.on_filter(TopicFilter::matching(predicate), handler)
    }

    /// Register a handler for any [`TopicFilter`].
    pub fn on_filter(&self, filter: TopicFilter, handler: Handler) -> HandlerId {
        match filter {
            TopicFilter::Any => self.on_any(handler),
            TopicFilter::Topic(topic) => self.on(topic, handler),
            TopicFilter::Matching(predicate) => {
                let id = self.next_id();
                self.inner
                    .registry
                    .write()
                    .predicates
                    .push((id, predicate, handler));
                id
            }
        }
    }

    /// Remove a registration. Returns false if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut registry = self.inner.registry.write();

        for handlers in registry.topics.values_mut() {
            if let Some(pos) = handlers.iter().position(|(h, _)| *h == id) {
                handlers.remove(pos);
                registry.topics.retain(|_, handlers| !handlers.is_empty());
                return true;
            }
        }

        let before = registry.predicates.len();
        registry.predicates.retain(|(h, _, _)| *h != id);
        registry.predicates.len() != before
    }

    /// Remove a handler from a topic by identity.
    pub fn off_handler(&self, topic: &str, handler: &Handler) -> bool {
        let mut registry = self.inner.registry.write();
        let Some(handlers) = registry.topics.get_mut(topic) else {
            return false;
        };
        let Some(pos) = handlers.iter().position(|(_, h)| Arc::ptr_eq(h, handler)) else {
            return false;
        };
        handlers.remove(pos);
        if handlers.is_empty() {
            registry.topics.remove(topic);
        }
        true
    }

    /// Number of handlers registered directly on a topic.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner
            .registry
            .read()
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every handler on its topic, every wildcard
    /// handler, and every predicate handler that matches. Returns the number
    /// of handlers invoked.
    ///
    /// Predicates and handlers run after the registry lock is released, so
    /// they may register or remove handlers themselves.
    pub fn emit(&self, event: Event) -> usize {
        let (mut targets, candidates): (Vec<Handler>, Vec<(Predicate, Handler)>) = {
            let registry = self.inner.registry.read();
            let direct = registry.topics.get(&event.topic).into_iter().flatten();
            let wildcard = if event.topic == TOPIC_ANY {
                None
            } else {
                registry.topics.get(TOPIC_ANY)
            };
            let targets = direct
                .chain(wildcard.into_iter().flatten())
                .map(|(_, handler)| handler.clone())
                .collect();
            let candidates = registry
                .predicates
                .iter()
                .map(|(_, predicate, handler)| (predicate.clone(), handler.clone()))
                .collect();
            (targets, candidates)
        };

        // Predicates, like handlers, run with the registry unlocked.
        targets.extend(
            candidates
                .into_iter()
                .filter(|(predicate, _)| {
                    catch_unwind(AssertUnwindSafe(|| predicate(&event))).unwrap_or(false)
                })
                .map(|(_, handler)| handler),
        );

        trace!(topic = %event.topic, handlers = targets.len(), "Emitting event");

        for handler in &targets {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(topic = %event.topic, "Event handler panicked; continuing delivery");
            }
        }

        targets.len()
    }

    /// Subscribe with an async receiver. The registration is removed when
    /// the returned stream is dropped.
    pub fn subscribe(&self, filter: TopicFilter) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on_filter(
            filter,
            handler(move |event| {
                let _ = tx.send(event.clone());
            }),
        );

        EventStream {
            rx,
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }
}

/// Async stream of events produced by [`EventBus::subscribe`].
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
    id: HandlerId,
    bus: Weak<BusInner>,
}

impl EventStream {
    /// Receive the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive an event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// The underlying registration.
    pub fn id(&self) -> HandlerId {
        self.id
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            EventBus { inner }.off(self.id);
        }
    }
}
