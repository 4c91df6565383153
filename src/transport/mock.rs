//! In-memory connector for tests and demos.
//!
//! Every successful `connect` creates a `tokio::io::duplex` pair: one end is
//! handed to the caller as the transport, the other end is queued as a
//! `MockPeer` that plays the remote device.

use super::error::TransportError;
use super::traits::{BoxedTransport, TransportConnector};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

/// Default in-flight buffer of each duplex pair.
const DEFAULT_BUFFER: usize = 64 * 1024;

#[derive(Debug, Default)]
struct MockConnectorState {
    /// Connection attempts per address (successful or not).
    attempts: HashMap<String, usize>,
    /// Addresses whose next attempt fails.
    fail_next: HashMap<String, String>,
    /// Addresses that always fail.
    unreachable: HashSet<String>,
    /// Artificial latency before a connect resolves.
    delay: Option<Duration>,
}

/// Remote end of a mock connection.
#[derive(Debug)]
pub struct MockPeer {
    address: String,
    stream: DuplexStream,
}

impl MockPeer {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Write raw bytes towards the local connection.
    pub async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Write `line` followed by a newline.
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.send(format!("{line}\n").as_bytes()).await
    }

    /// Read exactly `len` bytes written by the local connection.
    pub async fn receive(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read everything until the local side shuts its output down.
    pub async fn receive_to_end(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.stream.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Read one `\n`-terminated line, without the delimiter.
    pub async fn receive_line(&mut self) -> std::io::Result<String> {
        let mut line = Vec::new();
        loop {
            let byte = self.stream.read_u8().await?;
            if byte == b'\n' {
                break;
            }
            line.push(byte);
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Access the raw duplex end.
    pub fn stream_mut(&mut self) -> &mut DuplexStream {
        &mut self.stream
    }
}

/// Connector producing in-memory transports.
///
/// # Example
/// ```
/// use bt_serial::transport::{MockConnector, TransportConnector};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let connector = MockConnector::new();
/// let _transport = connector.connect("00:11:22:33:44:55").await.unwrap();
/// let peer = connector.accept().await.unwrap();
///
/// assert_eq!(peer.address(), "00:11:22:33:44:55");
/// assert_eq!(connector.attempts("00:11:22:33:44:55"), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockConnectorState>>,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>>,
    buffer: usize,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(MockConnectorState::default())),
            peers_tx,
            peers_rx: Arc::new(tokio::sync::Mutex::new(peers_rx)),
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Use a smaller duplex buffer, e.g. to exercise back-pressure.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Delay every connect by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Make the next attempt for `address` fail with `reason`.
    pub fn fail_next(&self, address: &str, reason: &str) {
        self.state
            .lock()
            .fail_next
            .insert(address.to_string(), reason.to_string());
    }

    /// Make every attempt for `address` fail.
    pub fn set_unreachable(&self, address: &str) {
        self.state.lock().unreachable.insert(address.to_string());
    }

    /// Number of connect attempts observed for `address`.
    pub fn attempts(&self, address: &str) -> usize {
        self.state.lock().attempts.get(address).copied().unwrap_or(0)
    }

    /// Wait for the remote end of the next established connection.
    pub async fn accept(&self) -> Option<MockPeer> {
        self.peers_rx.lock().await.recv().await
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(&self, address: &str) -> Result<BoxedTransport, TransportError> {
        let (delay, failure) = {
            let mut state = self.state.lock();
            *state.attempts.entry(address.to_string()).or_default() += 1;

            let failure = if state.unreachable.contains(address) {
                Some(TransportError::not_found(address))
            } else {
                state
                    .fail_next
                    .remove(address)
                    .map(TransportError::rejected)
            };
            (state.delay, failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = failure {
            return Err(failure);
        }

        let (local, remote) = tokio::io::duplex(self.buffer);
        let peer = MockPeer {
            address: address.to_string(),
            stream: remote,
        };
        if self.peers_tx.send(peer).is_err() {
            return Err(TransportError::rejected("mock peer receiver dropped"));
        }
        Ok(Box::new(local))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_pairs_with_peer() {
        let connector = MockConnector::new();
        let mut transport = connector.connect("AA").await.unwrap();
        let mut peer = connector.accept().await.unwrap();

        transport.write_all(b"hello\n").await.unwrap();
        assert_eq!(peer.receive_line().await.unwrap(), "hello");

        peer.send(b"back").await.unwrap();
        let mut buf = [0u8; 4];
        transport.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"back");
    }

    #[tokio::test]
    async fn test_fail_next_only_once() {
        let connector = MockConnector::new();
        connector.fail_next("AA", "busy");

        let first = connector.connect("AA").await;
        assert!(matches!(first, Err(TransportError::Rejected(ref r)) if r == "busy"));

        assert!(connector.connect("AA").await.is_ok());
        assert_eq!(connector.attempts("AA"), 2);
    }

    #[tokio::test]
    async fn test_unreachable_always_fails() {
        let connector = MockConnector::new();
        connector.set_unreachable("BB");

        for _ in 0..3 {
            assert!(matches!(
                connector.connect("BB").await,
                Err(TransportError::NotFound(_))
            ));
        }
        assert_eq!(connector.attempts("BB"), 3);
        assert_eq!(connector.attempts("CC"), 0);
    }

    #[tokio::test]
    async fn test_receive_to_end_after_shutdown() {
        let connector = MockConnector::new();
        let mut transport = connector.connect("AA").await.unwrap();
        let mut peer = connector.accept().await.unwrap();

        transport.write_all(b"bye").await.unwrap();
        transport.shutdown().await.unwrap();

        assert_eq!(peer.receive_to_end().await.unwrap(), b"bye");
    }
}
