//! Process-wide shared client lifecycle against a live gateway.
//!
//! Kept in its own test binary: the shared slot is process-global.

use gatelink_client::{shared, ClientError, ConnectionState};
use gatelink_core::config::ConfigBuilder;
use gatelink_integration_tests::MockGateway;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_replacing_shared_client_retires_previous() {
    let mock = MockGateway::start().await;
    let config = ConfigBuilder::new()
        .url(mock.ws_url())
        .token("first")
        .backoff_ms(50, 200)
        .build();

    let first = shared::install(config.clone()).unwrap();
    first.connect();
    tokio::time::timeout(Duration::from_secs(5), first.wait_connected())
        .await
        .unwrap()
        .unwrap();

    // Same endpoint and credential: same instance.
    let again = shared::install(config.clone()).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let pending = {
        let first = Arc::clone(&first);
        tokio::spawn(async move { first.request("silent", None).await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while first.pending_requests() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // A rotated credential replaces it; the old one is torn down first.
    let mut rotated = config.clone();
    rotated.gateway.token = Some("second".into());
    let second = shared::install(rotated).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.state(), ConnectionState::Disconnected);
    assert_eq!(first.pending_requests(), 0);

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionClosed)));

    second.connect();
    tokio::time::timeout(Duration::from_secs(5), second.wait_connected())
        .await
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&second, &shared::current().unwrap()));

    shared::reset();
    assert!(shared::current().is_none());
    assert_eq!(second.state(), ConnectionState::Disconnected);
}
