//! Assembling streamed responses into messages.
//!
//! A [`StreamAccumulator`] is bound to one session key and folds
//! [`StreamSignal`]s for that session into a transcript: a live partial
//! message while a response streams, replaced in place by the finalized
//! message once the stream ends. [`SessionStream`] wires an accumulator to
//! an [`EventBus`] and republishes the transcript through a watch channel.

use crate::delta::{self, EndReason, StreamSignal};
use crate::events::{handler, EventBus, HandlerId};
use gatelink_core::id;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Role given to messages assembled from a stream.
pub const ASSISTANT_ROLE: &str = "assistant";

/// One content block of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Thinking { thinking: String },
    Text { text: String },
}

/// A render-ready chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: String,
    pub session_key: String,
    pub blocks: Vec<ContentBlock>,
    /// True while this is a live partial that may still change.
    #[serde(default)]
    pub streaming: bool,
}

impl ChatMessage {
    /// Create a plain text message.
    pub fn text_message(
        role: impl Into<String>,
        session_key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id::sequential_id("msg"),
            role: role.into(),
            session_key: session_key.into(),
            blocks: vec![ContentBlock::Text { text: text.into() }],
            streaming: false,
        }
    }

    /// All text blocks, joined.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Thinking { .. } => None,
            })
            .collect()
    }

    /// All thinking blocks, joined.
    pub fn thinking(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
                ContentBlock::Text { .. } => None,
            })
            .collect()
    }
}

/// What applying a signal changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// The live partial message was created or grew.
    Partial(ChatMessage),
    /// A stream finished and produced this message.
    Finalized(ChatMessage),
}

impl StreamUpdate {
    pub fn message(&self) -> &ChatMessage {
        match self {
            Self::Partial(message) | Self::Finalized(message) => message,
        }
    }
}

#[derive(Debug)]
struct StreamState {
    message_id: String,
    text: String,
    thinking: String,
}

impl StreamState {
    fn new() -> Self {
        Self {
            message_id: id::sequential_id("msg"),
            text: String::new(),
            thinking: String::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty() && self.thinking.is_empty()
    }

    fn to_message(&self, session_key: &str, streaming: bool) -> ChatMessage {
        let mut blocks = Vec::with_capacity(2);
        if !self.thinking.is_empty() {
            blocks.push(ContentBlock::Thinking {
                thinking: self.thinking.clone(),
            });
        }
        if !self.text.is_empty() {
            blocks.push(ContentBlock::Text {
                text: self.text.clone(),
            });
        }

        ChatMessage {
            id: self.message_id.clone(),
            role: ASSISTANT_ROLE.to_string(),
            session_key: session_key.to_string(),
            blocks,
            streaming,
        }
    }
}

/// Per-session stream state machine: `idle -> streaming -> idle`.
#[derive(Debug)]
pub struct StreamAccumulator {
    session_key: String,
    active: Option<StreamState>,
    transcript: Vec<ChatMessage>,
}

impl StreamAccumulator {
    /// Create an accumulator bound to `session_key`.
    pub fn new(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            active: None,
            transcript: Vec::new(),
        }
    }

    /// Rebind to another session. Always clears the transcript and any
    /// in-progress stream, even when the key is unchanged.
    pub fn bind(&mut self, session_key: impl Into<String>) {
        let session_key = session_key.into();
        if self.active.is_some() {
            debug!(from = %self.session_key, to = %session_key, "Discarding in-progress stream on session switch");
        }
        self.session_key = session_key;
        self.active = None;
        self.transcript.clear();
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Messages in order, the live partial (if any) included in place.
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// The live partial message, if one has been published.
    pub fn live(&self) -> Option<&ChatMessage> {
        let active = self.active.as_ref()?;
        self.transcript.iter().find(|m| m.id == active.message_id)
    }

    /// Append a message that did not come from a stream (a user message,
    /// or one loaded from history).
    pub fn push(&mut self, message: ChatMessage) {
        self.transcript.push(message);
    }

    /// Fold one signal in. Signals for other sessions are ignored.
    pub fn apply(&mut self, signal: &StreamSignal) -> Option<StreamUpdate> {
        if signal.session_key() != self.session_key {
            return None;
        }

        match signal {
            StreamSignal::Start { .. } => {
                // A start while streaming closes the previous stream first.
                let finalized = self.finish();
                self.active = Some(StreamState::new());
                finalized
            }
            StreamSignal::Delta {
                text,
                thinking,
                last,
                ..
            } => {
                let state = self.active.get_or_insert_with(StreamState::new);
                if let Some(text) = text {
                    state.text.push_str(text);
                }
                if let Some(thinking) = thinking {
                    state.thinking.push_str(thinking);
                }

                if *last {
                    self.finish()
                } else {
                    self.publish_partial()
                }
            }
            StreamSignal::Complete { text, thinking, .. } => {
                let state = self.active.get_or_insert_with(StreamState::new);
                if let Some(text) = text {
                    state.text.clone_from(text);
                }
                if let Some(thinking) = thinking {
                    state.thinking.clone_from(thinking);
                }
                self.finish()
            }
            StreamSignal::End { reason, .. } => {
                match reason {
                    EndReason::Completed => {}
                    EndReason::Aborted => debug!(session = %self.session_key, "Stream aborted"),
                    EndReason::Failed(message) => {
                        debug!(session = %self.session_key, error = %message, "Stream failed")
                    }
                }
                self.finish()
            }
        }
    }

    fn publish_partial(&mut self) -> Option<StreamUpdate> {
        let state = self.active.as_ref()?;
        if state.is_empty() {
            return None;
        }
        let message = state.to_message(&self.session_key, true);
        self.upsert(message.clone());
        Some(StreamUpdate::Partial(message))
    }

    /// Close the active stream, replacing its partial with the finalized
    /// message. Nothing is produced for a stream with no content.
    fn finish(&mut self) -> Option<StreamUpdate> {
        let state = self.active.take()?;
        if state.is_empty() {
            return None;
        }
        let message = state.to_message(&self.session_key, false);
        self.upsert(message.clone());
        Some(StreamUpdate::Finalized(message))
    }

    fn upsert(&mut self, message: ChatMessage) {
        match self.transcript.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.transcript.push(message),
        }
    }
}

/// Snapshot published by a [`SessionStream`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamView {
    pub session_key: String,
    pub messages: Vec<ChatMessage>,
    pub streaming: bool,
}

impl StreamView {
    fn of(accumulator: &StreamAccumulator) -> Self {
        Self {
            session_key: accumulator.session_key().to_string(),
            messages: accumulator.transcript().to_vec(),
            streaming: accumulator.is_streaming(),
        }
    }
}

/// An accumulator fed from the event bus.
///
/// Every event is normalized; stream signals for the bound session update
/// the transcript and publish a new [`StreamView`]. The bus registration is
/// removed on drop.
pub struct SessionStream {
    bus: EventBus,
    handler_id: HandlerId,
    accumulator: Arc<Mutex<StreamAccumulator>>,
    view_tx: Arc<watch::Sender<StreamView>>,
}

impl SessionStream {
    /// Attach a new accumulator for `session_key` to `bus`.
    pub fn attach(bus: &EventBus, session_key: impl Into<String>) -> Self {
        let accumulator = Arc::new(Mutex::new(StreamAccumulator::new(session_key)));
        let (view_tx, _) = watch::channel(StreamView::of(&accumulator.lock()));
        let view_tx = Arc::new(view_tx);

        let acc = Arc::clone(&accumulator);
        let tx = Arc::clone(&view_tx);
        let handler_id = bus.on_any(handler(move |event| {
            let Some(signal) = delta::normalize(event) else {
                return;
            };
            let mut acc = acc.lock();
            if acc.apply(&signal).is_some() {
                tx.send_replace(StreamView::of(&acc));
            }
        }));

        Self {
            bus: bus.clone(),
            handler_id,
            accumulator,
            view_tx,
        }
    }

    /// Switch to another session, discarding the current transcript.
    pub fn bind(&self, session_key: impl Into<String>) {
        let mut acc = self.accumulator.lock();
        acc.bind(session_key);
        self.view_tx.send_replace(StreamView::of(&acc));
    }

    /// Append a non-streamed message and publish.
    pub fn push(&self, message: ChatMessage) {
        let mut acc = self.accumulator.lock();
        acc.push(message);
        self.view_tx.send_replace(StreamView::of(&acc));
    }

    pub fn session_key(&self) -> String {
        self.accumulator.lock().session_key().to_string()
    }

    /// Current snapshot.
    pub fn view(&self) -> StreamView {
        self.view_tx.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<StreamView> {
        self.view_tx.subscribe()
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.bus.off(self.handler_id);
    }
}
