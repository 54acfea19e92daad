//! Request/response correlation.
//!
//! Every outbound request gets a process-unique id and an entry in the
//! pending table. The entry is removed by exactly one of: a matching
//! response, its timeout firing, or connection teardown. Removal from the
//! table is the single point of arbitration, so a request settles once.

use crate::error::ClientError;
use crate::protocol::Response;
use gatelink_core::id;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Outcome delivered to the caller holding a pending request.
pub type Reply = Result<Value, ClientError>;

/// A request waiting for its response.
struct PendingRequest {
    method: String,
    reply: oneshot::Sender<Reply>,
    timer: AbortHandle,
    issued_at: Instant,
}

impl PendingRequest {
    fn settle(self, outcome: Reply) {
        self.timer.abort();
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.reply.send(outcome);
    }
}

struct CorrelatorInner {
    pending: Mutex<HashMap<String, PendingRequest>>,
    timeout: Duration,
}

/// Pending-request table with per-request timeouts.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

impl Correlator {
    /// Create a correlator whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CorrelatorInner {
                pending: Mutex::new(HashMap::new()),
                timeout,
            }),
        }
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Register a new pending request and start its timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, method: &str) -> (String, oneshot::Receiver<Reply>) {
        let request_id = id::sequential_id("req");
        let (reply, rx) = oneshot::channel();

        let mut pending = self.inner.pending.lock();
        let timer = spawn_timer(
            Arc::downgrade(&self.inner),
            request_id.clone(),
            self.inner.timeout,
        );
        pending.insert(
            request_id.clone(),
            PendingRequest {
                method: method.to_string(),
                reply,
                timer,
                issued_at: Instant::now(),
            },
        );

        (request_id, rx)
    }

    /// Settle the request a response answers. Returns false (and drops the
    /// response) when no request with that id is pending.
    pub fn resolve(&self, response: Response) -> bool {
        let Some(entry) = self.inner.pending.lock().remove(&response.id) else {
            debug!(id = %response.id, "Dropping response for unknown or expired request");
            return false;
        };

        debug!(
            id = %response.id,
            method = %entry.method,
            elapsed_ms = entry.issued_at.elapsed().as_millis() as u64,
            "Request settled"
        );
        entry.settle(response.into_result());
        true
    }

    /// Reject one pending request with a specific error.
    pub fn reject(&self, request_id: &str, error: ClientError) -> bool {
        match self.inner.pending.lock().remove(request_id) {
            Some(entry) => {
                entry.settle(Err(error));
                true
            }
            None => false,
        }
    }

    /// Reject every pending request with [`ClientError::ConnectionClosed`].
    /// Returns how many were rejected.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.inner.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            entry.settle(Err(ClientError::ConnectionClosed));
        }
        if count > 0 {
            debug!(count, "Rejected pending requests on connection teardown");
        }
        count
    }

    /// Number of requests still waiting.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Whether a request id is still waiting.
    pub fn is_pending(&self, request_id: &str) -> bool {
        self.inner.pending.lock().contains_key(request_id)
    }
}

impl CorrelatorInner {
    fn expire(&self, request_id: &str) {
        let Some(entry) = self.pending.lock().remove(request_id) else {
            return;
        };

        warn!(
            id = %request_id,
            method = %entry.method,
            timeout_ms = self.timeout.as_millis() as u64,
            "Request timed out"
        );
        let error = ClientError::Timeout {
            method: entry.method.clone(),
            timeout: self.timeout,
        };
        // Settling aborts this very timer task, which is already finishing.
        entry.settle(Err(error));
    }
}

fn spawn_timer(inner: Weak<CorrelatorInner>, request_id: String, timeout: Duration) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(inner) = inner.upgrade() {
            inner.expire(&request_id);
        }
    })
    .abort_handle()
}
