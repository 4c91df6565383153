//! Shared test utilities.
//!
//! - Registry construction over the in-memory connector
//! - An echo device playing the remote side
//! - Timeout helpers so a hung test fails instead of blocking

#![allow(dead_code)]

use bt_serial::transport::{MockConnector, MockPeer};
use bt_serial::ConnectionRegistry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

/// Upper bound for any single awaited step in a test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// A registry over a fresh mock connector; the connector handle is returned
/// to accept peers and inspect attempts.
pub fn mock_registry() -> (ConnectionRegistry, MockConnector) {
    let connector = MockConnector::new();
    let registry = ConnectionRegistry::new(Arc::new(connector.clone()));
    (registry, connector)
}

/// Await `future`, failing the test if it takes longer than `STEP_TIMEOUT`.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, future)
        .await
        .expect("step timed out")
}

/// Accept the next peer from `connector`.
pub async fn accept(connector: &MockConnector) -> MockPeer {
    within(connector.accept()).await.expect("no peer connected")
}

/// Play a device that writes back every line it receives.
pub fn spawn_echo(mut peer: MockPeer) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(peer.stream_mut());
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply = format!("{line}\n");
            if writer.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    })
}
