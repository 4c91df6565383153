//! Registry behaviour over the in-memory connector.

mod common;

use bt_serial::transport::MockConnector;
use bt_serial::{ConnectionRegistry, Encoding, SerialError, TransportError};
use common::{accept, mock_registry, within};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn concurrent_opens_share_one_connect() {
    let connector = MockConnector::new();
    connector.set_delay(Duration::from_millis(50));
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(connector.clone())));

    let opens = (0..8).map(|_| {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.open("00:11:22:33:44:55").await })
    });
    let connections: Vec<_> = within(join_all(opens))
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(connector.attempts("00:11:22:33:44:55"), 1);
    assert!(connections
        .iter()
        .all(|connection| connection.same_as(&connections[0])));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn concurrent_opens_for_different_addresses_run_independently() {
    let connector = MockConnector::new();
    connector.set_delay(Duration::from_millis(20));
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(connector.clone())));

    let a = registry.open("A");
    let b = registry.open("B");
    let (a, b) = within(async { tokio::join!(a, b) }).await;

    assert!(!a.unwrap().same_as(&b.unwrap()));
    assert_eq!(registry.addresses(), vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn waiters_retry_after_a_failed_attempt() {
    let connector = MockConnector::new();
    connector.set_delay(Duration::from_millis(30));
    connector.fail_next("A", "channel busy");
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(connector.clone())));

    let first = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.open("A").await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = registry.open("A").await;

    let first = first.await.unwrap();
    let err = first.unwrap_err();
    assert!(matches!(err.source, TransportError::Rejected(_)));
    assert!(second.is_ok());
    assert_eq!(connector.attempts("A"), 2);
}

#[tokio::test]
async fn unreachable_address_reports_connect_error() {
    let (registry, connector) = mock_registry();
    connector.set_unreachable("GONE");

    let err = registry.open("GONE").await.unwrap_err();
    assert_eq!(err.address, "GONE");
    assert!(err.to_string().starts_with("Failed to connect to GONE"));
    let wrapped: SerialError = err.into();
    assert!(matches!(wrapped, SerialError::Connect(_)));
}

#[tokio::test]
async fn close_by_adapter_removes_entry() {
    let (registry, connector) = mock_registry();
    let connection = registry.open("A").await.unwrap();
    let _peer = accept(&connector).await;

    let adapter = connection.to_listener_interface().unwrap();
    registry.close(&adapter).await;

    assert!(connection.is_closed());
    assert!(adapter.is_closed());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn close_all_closes_everything() {
    let (registry, connector) = mock_registry();
    let a = registry.open("A").await.unwrap();
    let b = registry.open_with_encoding("B", Encoding::Latin1).await.unwrap();
    let mut peer_a = accept(&connector).await;
    let mut peer_b = accept(&connector).await;

    registry.close_all().await;

    assert!(a.is_closed());
    assert!(b.is_closed());
    assert!(registry.is_empty());
    assert!(within(peer_a.receive_to_end()).await.unwrap().is_empty());
    assert!(within(peer_b.receive_to_end()).await.unwrap().is_empty());
}

#[tokio::test]
async fn dropping_registry_closes_connections() {
    let (registry, connector) = mock_registry();
    let connection = registry.open("A").await.unwrap();
    let adapter = connection.to_listener_interface().unwrap();
    let mut peer = accept(&connector).await;

    drop(registry);

    assert!(connection.is_closed());
    assert!(adapter.is_closed());
    assert!(within(peer.receive_to_end()).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_adapter_does_not_close_newer_connection() {
    let (registry, connector) = mock_registry();
    let old = registry.open("A").await.unwrap();
    let _old_peer = accept(&connector).await;
    let old_adapter = old.to_listener_interface().unwrap();

    registry.close("A").await;
    drop(old);

    let fresh = registry.open("A").await.unwrap();
    let _fresh_peer = accept(&connector).await;
    registry.close(&old_adapter).await;

    assert!(!fresh.is_closed());
    assert_eq!(registry.len(), 1);
    assert!(registry.get("A").unwrap().same_as(&fresh));
}

#[tokio::test]
async fn stale_connection_does_not_close_newer_connection() {
    let (registry, connector) = mock_registry();
    let old = registry.open("A").await.unwrap();
    let _old_peer = accept(&connector).await;
    registry.close("A").await;

    let fresh = registry.open("A").await.unwrap();
    let _fresh_peer = accept(&connector).await;
    registry.close(&Arc::new(old)).await;

    assert!(!fresh.is_closed());
    assert!(registry.get("A").unwrap().same_as(&fresh));
}
