//! Normalization of streamed-response events.
//!
//! The gateway expresses streaming through several event shapes:
//!
//! - boundary topics: `stream_start`, `stream_delta`, `stream_end`
//!   (optionally prefixed with `chat.`)
//! - a typed shape: topic `chat` or `agent` with `type`/`state` set to
//!   `start`, `delta`, `final`, `end`, `error`, or `aborted`
//! - a token-only shape: topic `token` or `chat.token`
//!
//! [`normalize`] folds all of them into one [`StreamSignal`] so the
//! accumulator only ever sees a single shape.
//!
//! Fragments always append. The one exception is a typed `final` frame that
//! carries a `message`: that is the whole response, so it becomes
//! [`StreamSignal::Complete`] and replaces whatever was accumulated.

use crate::events::Event;
use serde_json::Value;

/// A normalized streaming signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// A response stream began.
    Start { session_key: String },

    /// A fragment of the in-progress response.
    Delta {
        session_key: String,
        text: Option<String>,
        thinking: Option<String>,
        /// The gateway marked this delta as the last one.
        last: bool,
    },

    /// The complete response, replacing any accumulated fragments and
    /// closing the stream.
    Complete {
        session_key: String,
        text: Option<String>,
        thinking: Option<String>,
    },

    /// The response stream finished.
    End {
        session_key: String,
        reason: EndReason,
    },
}

/// Why a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    Aborted,
    Failed(String),
}

impl StreamSignal {
    /// The session this signal is tagged with.
    pub fn session_key(&self) -> &str {
        match self {
            Self::Start { session_key }
            | Self::Delta { session_key, .. }
            | Self::Complete { session_key, .. }
            | Self::End { session_key, .. } => session_key,
        }
    }
}

/// Convert an event into a stream signal. Returns `None` for events that
/// are not part of a response stream or carry no session key.
pub fn normalize(event: &Event) -> Option<StreamSignal> {
    let topic = event
        .topic
        .strip_prefix("chat.")
        .unwrap_or(event.topic.as_str());
    let data = &event.data;

    let phase = match topic {
        "stream_start" => Phase::Start,
        "stream_delta" | "delta" | "token" => {
            if flag(data, "final") || flag(data, "done") {
                Phase::LastDelta
            } else {
                Phase::Delta
            }
        }
        "stream_end" => Phase::End(end_reason(data)),
        "chat" | "agent" => typed_phase(data)?,
        _ => return None,
    };

    let session_key = session_key(data)?;

    Some(match phase {
        Phase::Start => StreamSignal::Start { session_key },
        Phase::Delta | Phase::LastDelta => StreamSignal::Delta {
            session_key,
            text: fragment(data),
            thinking: non_empty(data.get("thinking")),
            last: matches!(phase, Phase::LastDelta),
        },
        Phase::Complete => {
            let message = data.get("message");
            StreamSignal::Complete {
                session_key,
                text: message_text(message),
                thinking: non_empty(message.and_then(|m| m.get("thinking")))
                    .or_else(|| non_empty(data.get("thinking"))),
            }
        }
        Phase::End(reason) => StreamSignal::End {
            session_key,
            reason,
        },
    })
}

enum Phase {
    Start,
    Delta,
    LastDelta,
    Complete,
    End(EndReason),
}

fn typed_phase(data: &Value) -> Option<Phase> {
    let marker = data
        .get("type")
        .or_else(|| data.get("state"))
        .and_then(Value::as_str)?;

    Some(match marker {
        "start" | "stream_start" => Phase::Start,
        "delta" | "token" | "stream_delta" => Phase::Delta,
        "final" if message_text(data.get("message")).is_some() => Phase::Complete,
        "final" => Phase::LastDelta,
        "end" | "done" | "stream_end" => Phase::End(EndReason::Completed),
        "aborted" => Phase::End(EndReason::Aborted),
        "error" => Phase::End(EndReason::Failed(error_message(data))),
        _ => return None,
    })
}

fn end_reason(data: &Value) -> EndReason {
    if flag(data, "aborted") {
        EndReason::Aborted
    } else if data.get("error").is_some_and(|e| !e.is_null()) {
        EndReason::Failed(error_message(data))
    } else {
        EndReason::Completed
    }
}

fn error_message(data: &Value) -> String {
    match data.get("error").or_else(|| data.get("errorMessage")) {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(object)) => object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("stream failed")
            .to_string(),
        _ => "stream failed".to_string(),
    }
}

fn session_key(data: &Value) -> Option<String> {
    ["sessionKey", "session_key", "session"]
        .iter()
        .find_map(|field| data.get(*field).and_then(Value::as_str))
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// The text fragment, looked up as `token`, then `delta`, then `text`, then
/// a nested `message.text`.
fn fragment(data: &Value) -> Option<String> {
    non_empty(data.get("token"))
        .or_else(|| non_empty(data.get("delta")))
        .or_else(|| non_empty(data.get("text")))
        .or_else(|| non_empty(data.get("message").and_then(|m| m.get("text"))))
}

fn message_text(message: Option<&Value>) -> Option<String> {
    match message? {
        Value::String(text) => Some(text.clone()).filter(|t| !t.is_empty()),
        object => non_empty(object.get("text")),
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn flag(data: &Value, field: &str) -> bool {
    data.get(field).and_then(Value::as_bool).unwrap_or(false)
}
