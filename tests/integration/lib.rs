//! In-process mock gateway for integration tests.
//!
//! Serves `/ws` (WebSocket, bearer-authenticated via header or `token`
//! query parameter) and `/rpc` (the HTTP fallback) on an ephemeral port.
//!
//! Methods:
//! - `echo`: returns its params
//! - `fail`: remote error `-32000 boom`
//! - `silent`: never answers
//! - `slow`: answers after `params.delay_ms`
//! - `drop`: closes the socket without answering
//! - `chat`: acknowledges, then streams "Hel", "lo", " world" for the
//!   requested session, with a stray delta for another session in between
//! - `chat.history`, `chat.abort`: canned results
//! - anything else: method not found

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// Session key the `chat` method injects stray deltas for.
pub const STRAY_SESSION: &str = "intruder";

struct MockState {
    token: Option<String>,
    connections: AtomicUsize,
    received: Mutex<Vec<Value>>,
    kill: broadcast::Sender<()>,
    push: broadcast::Sender<String>,
}

/// A running mock gateway. Stops when dropped.
pub struct MockGateway {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockGateway {
    /// Start a gateway that accepts any client.
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Start a gateway that requires `token`.
    pub async fn with_token(token: &str) -> Self {
        Self::spawn(Some(token.to_string())).await
    }

    async fn spawn(token: Option<String>) -> Self {
        let (kill, _) = broadcast::channel(4);
        let (push, _) = broadcast::channel(64);
        let state = Arc::new(MockState {
            token,
            connections: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            kill,
            push,
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/rpc", post(rpc_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock gateway");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// WebSocket endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// HTTP fallback endpoint.
    pub fn rpc_url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    /// WebSocket sessions accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Request envelopes received over either path.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().expect("received lock").clone()
    }

    /// Close every live socket.
    pub fn drop_connections(&self) {
        let _ = self.state.kill.send(());
    }

    /// Send a raw text frame to every live socket.
    pub fn push_raw(&self, frame: impl Into<String>) {
        let _ = self.state.push.send(frame.into());
    }

    /// Publish an event to every live socket.
    pub fn push_event(&self, topic: &str, data: Value) {
        self.push_raw(json!({"event": topic, "data": data}).to_string());
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn authorized(state: &MockState, headers: &HeaderMap, query: &HashMap<String, String>) -> bool {
    let Some(expected) = &state.token else {
        return true;
    };
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer == Some(expected.as_str()) || query.get("token") == Some(expected)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<MockState>>,
) -> Response {
    if !authorized(&state, &headers, &query) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn rpc_handler(
    headers: HeaderMap,
    State(state): State<Arc<MockState>>,
    Json(request): Json<Value>,
) -> Response {
    if !authorized(&state, &headers, &HashMap::new()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.received.lock().expect("received lock").push(request.clone());

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    match answer(method, &params) {
        Some(Ok(result)) => Json(json!({"id": id, "result": result})).into_response(),
        Some(Err((code, message))) => {
            Json(json!({"id": id, "error": {"code": code, "message": message}})).into_response()
        }
        None => StatusCode::GATEWAY_TIMEOUT.into_response(),
    }
}

/// Immediate answer for a method, `None` for methods that never answer.
fn answer(method: &str, params: &Value) -> Option<Result<Value, (i64, String)>> {
    Some(match method {
        "echo" => Ok(params.clone()),
        "fail" => Err((-32000, "boom".to_string())),
        "silent" | "drop" | "slow" => return None,
        "chat" => Ok(json!({
            "status": "started",
            "session_key": params.get("session_key").cloned().unwrap_or(Value::Null),
        })),
        "chat.history" => Ok(json!({
            "session_key": params.get("session_key").cloned().unwrap_or(Value::Null),
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "Hello world"},
            ],
            "total": 2,
        })),
        "chat.abort" => Ok(json!({"aborted": true})),
        other => Err((-32601, format!("Method not found: {}", other))),
    })
}

fn envelope(id: &Value, outcome: Result<Value, (i64, String)>) -> String {
    match outcome {
        Ok(result) => json!({"id": id, "result": result}),
        Err((code, message)) => json!({"id": id, "error": {"code": code, "message": message}}),
    }
    .to_string()
}

fn event(topic: &str, data: Value) -> String {
    json!({"event": topic, "data": data}).to_string()
}

/// The frames streamed after a `chat` request for `session`.
fn chat_stream(session: &str) -> Vec<String> {
    vec![
        event("chat.stream_start", json!({"sessionKey": session})),
        event("stream_delta", json!({"sessionKey": session, "delta": "Hel"})),
        event("stream_delta", json!({"sessionKey": STRAY_SESSION, "delta": "XX"})),
        event("chat.token", json!({"sessionKey": session, "token": "lo"})),
        event(
            "chat",
            json!({"type": "delta", "sessionKey": session, "text": " world"}),
        ),
        event("chat.stream_end", json!({"sessionKey": session})),
    ]
}

async fn handle_socket(socket: WebSocket, state: Arc<MockState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sender, mut receiver) = socket.split();
    let mut kill = state.kill.subscribe();
    let mut push = state.push.subscribe();

    // Delayed answers are written back through this queue.
    let (late_tx, mut late_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            _ = kill.recv() => break,
            Ok(frame) = push.recv() => {
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            Some(frame) = late_rx.recv() => {
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    state.received.lock().expect("received lock").push(request.clone());

                    let id = request.get("id").cloned().unwrap_or(Value::Null);
                    let method = request.get("method").and_then(Value::as_str).unwrap_or("").to_string();
                    let params = request.get("params").cloned().unwrap_or(Value::Null);
                    debug!(%method, "Mock gateway received request");

                    match method.as_str() {
                        "drop" => break,
                        "silent" => {}
                        "slow" => {
                            let delay = params.get("delay_ms").and_then(Value::as_u64).unwrap_or(100);
                            let late_tx = late_tx.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(Duration::from_millis(delay)).await;
                                let _ = late_tx.send(envelope(&id, Ok(json!({"late": true}))));
                            });
                        }
                        _ => {
                            let Some(outcome) = answer(&method, &params) else {
                                continue;
                            };
                            if sender.send(Message::Text(envelope(&id, outcome))).await.is_err() {
                                break;
                            }
                            if method == "chat" {
                                let session = params
                                    .get("session_key")
                                    .and_then(Value::as_str)
                                    .unwrap_or("default")
                                    .to_string();
                                for frame in chat_stream(&session) {
                                    if sender.send(Message::Text(frame)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.close().await;
}
