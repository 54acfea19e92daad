//! Wire envelopes.
//!
//! Every frame is one JSON object. Outbound frames are always requests;
//! inbound frames are responses (carry `id`), events (carry `event`), or
//! anything else, which is surfaced as [`Inbound::Unrecognized`].

use crate::error::ClientError;
use crate::events::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed back by the response.
    pub id: String,

    /// Method name.
    pub method: String,

    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a new request.
    pub fn new(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Set the parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers.
    pub id: String,

    /// Result (on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error (on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    /// Create a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn failure(id: impl Into<String>, error: RemoteError) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Collapse into the caller-facing outcome. A response with neither
    /// field resolves to `null`.
    pub fn into_result(self) -> Result<Value, ClientError> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error code.
    #[serde(default)]
    pub code: i64,

    /// Error message.
    pub message: String,

    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    /// Create a new error.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Method not found error (-32601).
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(-32601, format!("Method not found: {}", method.into()))
    }
}

impl From<RemoteError> for ClientError {
    fn from(error: RemoteError) -> Self {
        ClientError::Remote {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answer to a correlated request.
    Response(Response),
    /// Server-pushed event.
    Event(Event),
    /// Neither shape; kept verbatim for diagnostics.
    Unrecognized(Value),
}

/// Decode one text frame. Never fails: malformed input becomes
/// [`Inbound::Unrecognized`] so a single bad frame cannot break the link.
pub fn decode(text: &str) -> Inbound {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return Inbound::Unrecognized(Value::String(text.to_string())),
    };

    let Some(object) = value.as_object() else {
        return Inbound::Unrecognized(value);
    };

    // An id alone is not a response: it must also carry a result or error.
    let answers = object.contains_key("result") || object.contains_key("error");
    if let Some(id) = object.get("id").and_then(id_string).filter(|_| answers) {
        return Inbound::Response(Response {
            id,
            result: object.get("result").cloned(),
            error: object.get("error").filter(|e| !e.is_null()).map(remote_error),
        });
    }

    if let Some(topic) = object.get("event").and_then(Value::as_str) {
        let data = object.get("data").cloned().unwrap_or(Value::Null);
        return Inbound::Event(Event::new(topic, data));
    }

    Inbound::Unrecognized(value)
}

/// Ids are opaque; numeric ids from lenient servers are compared as text.
fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn remote_error(error: &Value) -> RemoteError {
    match error {
        Value::String(message) => RemoteError::new(-32000, message.clone()),
        other => serde_json::from_value(other.clone())
            .unwrap_or_else(|_| RemoteError::new(-32000, other.to_string())),
    }
}
