//! Stateless request/response path.
//!
//! While the socket is down, request-shaped calls can go over plain HTTP to
//! the same gateway. The body is the usual `{id, method, params}` request
//! envelope and the reply uses the same `{result | error}` shape.

use crate::error::ClientError;
use crate::protocol::{self, Request};
use crate::Result;
use async_trait::async_trait;
use gatelink_core::{id, SecretString};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A transport able to carry one request without a live socket.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Issue one call and return its result.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value>;
}

/// HTTP implementation of [`FallbackTransport`].
pub struct HttpFallback {
    /// Endpoint that accepts POSTed request envelopes.
    url: String,

    /// Bearer credential.
    token: Option<SecretString>,

    /// HTTP client.
    client: Client,
}

impl HttpFallback {
    /// Create a fallback for `url` with the given request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Fallback(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            token: None,
            client,
        })
    }

    /// Set the bearer credential.
    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FallbackTransport for HttpFallback {
    fn name(&self) -> &str {
        "http"
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut request = Request::new(id::sequential_id("http"), method);
        request.params = params;

        debug!(method, url = %self.url, "Sending fallback request");

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Fallback(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Fallback(format!("Failed to read response: {}", e)))?;

        // Error envelopes may come with a non-2xx status; prefer the envelope.
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        if let Some(error) = parsed.as_ref().and_then(|v| v.get("error")).filter(|e| !e.is_null()) {
            return Err(protocol::remote_error(error).into());
        }

        if !status.is_success() {
            return Err(ClientError::Fallback(format!("HTTP {}: {}", status, body)));
        }

        match parsed {
            Some(Value::Object(mut object)) if object.contains_key("result") => {
                Ok(object.remove("result").unwrap_or(Value::Null))
            }
            Some(other) => Ok(other),
            None if body.trim().is_empty() => Ok(Value::Null),
            None => Err(ClientError::Fallback(format!(
                "Failed to parse response: {}",
                body
            ))),
        }
    }
}
