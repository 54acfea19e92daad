//! End-to-end tests of the gateway client against the mock gateway.

use gatelink_client::{
    handler, CallPath, ClientError, ConnectionState, Event, EventKind, GatewayClient,
    TopicFilter, TOPIC_STATE, TOPIC_UNRECOGNIZED,
};
use gatelink_core::config::ConfigBuilder;
use gatelink_core::ClientConfig;
use gatelink_integration_tests::{MockGateway, STRAY_SESSION};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn config(url: &str) -> ClientConfig {
    ConfigBuilder::new()
        .url(url)
        .timeout_ms(2_000)
        .backoff_ms(50, 200)
        .build()
}

async fn connected(config: ClientConfig) -> GatewayClient {
    let client = GatewayClient::new(config).unwrap();
    client.connect();
    tokio::time::timeout(WAIT, client.wait_connected())
        .await
        .expect("connected in time")
        .expect("connected");
    client
}

/// Poll `condition` until it holds or `WAIT` elapses.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_request_response_roundtrip() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let result = client.request("echo", Some(json!({"a": 1}))).await.unwrap();
    assert_eq!(result, json!({"a": 1}));
    assert_eq!(client.pending_requests(), 0);

    let received = mock.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["method"], "echo");
    assert!(received[0]["id"].is_string());
}

#[tokio::test]
async fn test_concurrent_requests_resolve_by_id() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let (a, b, c) = tokio::join!(
        client.request("echo", Some(json!(1))),
        client.request("echo", Some(json!(2))),
        client.request("echo", Some(json!(3))),
    );
    assert_eq!(
        (a.unwrap(), b.unwrap(), c.unwrap()),
        (json!(1), json!(2), json!(3))
    );
}

#[tokio::test]
async fn test_typed_request() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let echoed: Vec<String> = client
        .request_as("echo", &vec!["x".to_string(), "y".to_string()])
        .await
        .unwrap();
    assert_eq!(echoed, vec!["x", "y"]);
}

#[tokio::test]
async fn test_remote_error_is_surfaced() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let err = client.request("fail", None).await.unwrap_err();
    match err {
        ClientError::Remote { code, message, .. } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "boom");
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    let err = client.request("no.such.method", None).await.unwrap_err();
    assert_eq!(err.code(), Some(-32601));

    // The link survives remote errors.
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_request_times_out() {
    let mock = MockGateway::start().await;
    let mut cfg = config(&mock.ws_url());
    cfg.requests.timeout_ms = 150;
    let client = connected(cfg).await;

    let started = std::time::Instant::now();
    let err = client.request("silent", None).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_late_response_is_dropped() {
    let mock = MockGateway::start().await;
    let mut cfg = config(&mock.ws_url());
    cfg.requests.timeout_ms = 100;
    let client = connected(cfg).await;
    let mut unrecognized = client.subscribe(TopicFilter::topic(TOPIC_UNRECOGNIZED));

    let err = client
        .request("slow", Some(json!({"delay_ms": 300})))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    // Let the late answer arrive.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(unrecognized.try_recv().is_none());
    assert_eq!(client.pending_requests(), 0);

    // The link is still healthy.
    assert_eq!(
        client.request("echo", Some(json!("ok"))).await.unwrap(),
        json!("ok")
    );
}

#[tokio::test]
async fn test_disconnect_rejects_pending_and_stops() {
    let mock = MockGateway::start().await;
    let client = Arc::new(connected(config(&mock.ws_url())).await);

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.request("silent", None).await })
    };
    assert!(eventually(|| client.pending_requests() == 1).await);

    client.disconnect();
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let result = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionClosed)));

    // Retired: no reconnect, and requests fail fast.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.connections(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.request("echo", None).await,
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    client.on(
        TOPIC_STATE,
        handler(move |event| {
            if let EventKind::StateChanged(state) = event.kind() {
                sink.lock().unwrap().push(state);
            }
        }),
    );

    mock.drop_connections();

    assert!(eventually(|| mock.connections() == 2 && client.is_connected()).await);
    assert_eq!(client.reconnect_attempts(), 0);

    let seen = states.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Reconnecting,
            ConnectionState::Connected,
        ]
    );

    assert_eq!(
        client.request("echo", Some(json!("again"))).await.unwrap(),
        json!("again")
    );
}

#[tokio::test]
async fn test_in_flight_request_rejected_on_connection_loss() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let err = client.request("drop", None).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
    assert!(err.is_transient());

    assert!(eventually(|| client.is_connected()).await);
    assert_eq!(mock.connections(), 2);
}

#[tokio::test]
async fn test_token_is_attached_to_handshake() {
    let mock = MockGateway::with_token("right").await;

    let mut good = config(&mock.ws_url());
    good.gateway.token = Some("right".into());
    let client = connected(good).await;
    assert!(client.is_connected());

    let mut bad = config(&mock.ws_url());
    bad.gateway.token = Some("wrong".into());
    let rejected = GatewayClient::new(bad).unwrap();
    let mut watch = rejected.watch_state();
    rejected.connect();

    tokio::time::timeout(
        WAIT,
        watch.wait_for(|s| *s == ConnectionState::Reconnecting),
    )
    .await
    .expect("reconnect scheduled")
    .unwrap();
    assert!(rejected.reconnect_attempts() >= 1);
    assert!(!rejected.is_connected());
    assert_eq!(mock.connections(), 1);
    rejected.disconnect();
}

#[tokio::test]
async fn test_stream_accumulates_per_session() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let mine = client.stream_session("s1");
    let stray = client.stream_session(STRAY_SESSION);
    let mut views = mine.watch();

    let ack = client.send_message("s1", "hi").await.unwrap();
    assert_eq!(ack["status"], "started");

    let view = tokio::time::timeout(
        WAIT,
        views.wait_for(|v| !v.streaming && !v.messages.is_empty()),
    )
    .await
    .expect("stream finished")
    .unwrap()
    .clone();

    assert_eq!(view.session_key, "s1");
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].text(), "Hello world");
    assert_eq!(view.messages[0].role, "assistant");
    assert!(!view.messages[0].streaming);

    // The stray delta landed only in its own session.
    assert!(eventually(|| stray.view().messages.first().map(|m| m.text()) == Some("XX".to_string())).await);
    assert!(stray.view().streaming);

    let request = &mock.received()[0];
    assert_eq!(request["method"], "chat");
    assert_eq!(request["params"]["session_key"], "s1");
    assert_eq!(request["params"]["message"], "hi");
}

#[tokio::test]
async fn test_stream_signals_are_typed() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;
    let mut signals = client.subscribe(TopicFilter::matching(|event: &Event| {
        matches!(event.kind(), EventKind::Stream(_))
    }));

    client.send_message("s1", "hi").await.unwrap();

    let mut count = 0;
    while count < 6 {
        let event = tokio::time::timeout(WAIT, signals.recv())
            .await
            .expect("signal in time")
            .expect("stream open");
        assert!(matches!(event.kind(), EventKind::Stream(_)));
        count += 1;
    }
}

#[tokio::test]
async fn test_topic_and_wildcard_handlers() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;

    let topic_hits = Arc::new(Mutex::new(Vec::<Value>::new()));
    let wildcard_hits = Arc::new(Mutex::new(Vec::<String>::new()));

    let sink = Arc::clone(&topic_hits);
    let topic_id = client.on(
        "presence",
        handler(move |event| sink.lock().unwrap().push(event.data.clone())),
    );
    let sink = Arc::clone(&wildcard_hits);
    client.on_any(handler(move |event| {
        sink.lock().unwrap().push(event.topic.clone())
    }));

    mock.push_event("presence", json!({"online": 3}));
    assert!(eventually(|| topic_hits.lock().unwrap().len() == 1).await);
    assert_eq!(topic_hits.lock().unwrap()[0], json!({"online": 3}));
    assert!(eventually(|| wildcard_hits.lock().unwrap().contains(&"presence".to_string())).await);

    assert!(client.off(topic_id));
    mock.push_event("presence", json!({"online": 4}));
    assert!(eventually(|| {
        wildcard_hits
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == "presence")
            .count()
            == 2
    })
    .await);
    assert_eq!(topic_hits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unrecognized_frames_are_routed() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;
    let mut unrecognized = client.subscribe(TopicFilter::topic(TOPIC_UNRECOGNIZED));

    mock.push_raw("not json");
    mock.push_raw(r#"{"foo": 1}"#);

    let first = tokio::time::timeout(WAIT, unrecognized.recv()).await.unwrap().unwrap();
    assert_eq!(first.data, json!("not json"));
    let second = tokio::time::timeout(WAIT, unrecognized.recv()).await.unwrap().unwrap();
    assert_eq!(second.data, json!({"foo": 1}));

    // Malformed frames do not hurt the link.
    assert!(client.is_connected());
    assert_eq!(client.request("echo", Some(json!(1))).await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_id_bearing_frames_are_not_swallowed() {
    let mock = MockGateway::start().await;
    let client = connected(config(&mock.ws_url())).await;
    let mut presence = client.subscribe(TopicFilter::topic("presence"));
    let mut unrecognized = client.subscribe(TopicFilter::topic(TOPIC_UNRECOGNIZED));

    mock.push_raw(r#"{"id":"evt-1","event":"presence","data":{"online":3}}"#);
    mock.push_raw(r#"{"id":"srv-9","method":"ping"}"#);

    let event = tokio::time::timeout(WAIT, presence.recv()).await.unwrap().unwrap();
    assert_eq!(event.data, json!({"online": 3}));
    let diagnostic = tokio::time::timeout(WAIT, unrecognized.recv()).await.unwrap().unwrap();
    assert_eq!(diagnostic.data, json!({"id": "srv-9", "method": "ping"}));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_fallback_when_socket_down() {
    let mock = MockGateway::with_token("t").await;
    let cfg = ConfigBuilder::new()
        .url("ws://127.0.0.1:1/ws")
        .http_url(mock.rpc_url())
        .token("t")
        .build();
    let client = GatewayClient::new(cfg).unwrap();

    let routed = client.call("echo", Some(json!({"x": 1}))).await.unwrap();
    assert_eq!(routed.path, CallPath::Fallback);
    assert_eq!(routed.value, json!({"x": 1}));

    let history = client.fetch_history("s1", Some(10)).await.unwrap();
    assert_eq!(history["total"], 2);

    let err = client.call("fail", None).await.unwrap_err();
    assert_eq!(err.code(), Some(-32000));
}

#[tokio::test]
async fn test_socket_path_preferred_when_connected() {
    let mock = MockGateway::start().await;
    let cfg = ConfigBuilder::new()
        .url(mock.ws_url())
        .http_url(mock.rpc_url())
        .build();
    let client = connected(cfg).await;

    let routed = client.call("echo", Some(json!("hi"))).await.unwrap();
    assert_eq!(routed.path, CallPath::Socket);

    // Sent exactly once, over one path.
    assert_eq!(mock.received().len(), 1);
}

#[tokio::test]
async fn test_failed_socket_call_is_not_retried_on_fallback() {
    let mock = MockGateway::start().await;
    let cfg = ConfigBuilder::new()
        .url(mock.ws_url())
        .http_url(mock.rpc_url())
        .build();
    let client = connected(cfg).await;

    let err = client.call("drop", None).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
    assert_eq!(mock.received().len(), 1);
}
