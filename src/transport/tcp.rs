//! TCP connector.
//!
//! Useful for RFCOMM bridges that expose the serial profile on a socket and
//! for exercising the framing layer without a radio.

use super::error::TransportError;
use super::traits::{BoxedTransport, TransportConnector};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Connects to `host:port` addresses.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable Nagle's algorithm on established sockets.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<BoxedTransport, TransportError> {
        if !address.contains(':') {
            return Err(TransportError::invalid_address(
                address,
                "expected host:port",
            ));
        }

        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(self.nodelay)?;
        debug!(%address, peer = ?stream.peer_addr().ok(), "tcp channel established");
        Ok(Box::new(stream))
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_rejects_address_without_port() {
        let result = TcpConnector::new().connect("localhost").await;
        assert!(matches!(
            result,
            Err(TransportError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut transport = TcpConnector::new()
            .with_nodelay(true)
            .connect(&address)
            .await
            .unwrap();
        transport.write_all(b"ping").await.unwrap();

        assert_eq!(&accept.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_refused_connection_is_io_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpConnector::new().connect(&address).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
