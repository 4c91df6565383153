//! Connection-level error types.

use crate::transport::TransportError;
use thiserror::Error;

/// A failure while establishing a connection.
///
/// Wraps whatever the connector reported (bad address, unreachable remote,
/// refused channel). No retry is attempted.
#[derive(Debug, Error)]
#[error("Failed to connect to {address}: {source}")]
pub struct ConnectError {
    pub address: String,
    #[source]
    pub source: TransportError,
}

impl ConnectError {
    pub fn new(address: impl Into<String>, source: TransportError) -> Self {
        Self {
            address: address.into(),
            source,
        }
    }
}

/// Errors surfaced by connections and listener adapters.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The operation was attempted after the connection was closed.
    #[error("Device connection closed")]
    ConnectionClosed,

    /// Reading from or writing to an open connection failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Establishing the connection failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

impl From<std::io::Error> for SerialError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(TransportError::Io(err))
    }
}

impl SerialError {
    /// True for `ConnectionClosed`.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let err = ConnectError::new("00:11:22:33:44:55", TransportError::rejected("busy"));
        assert_eq!(
            err.to_string(),
            "Failed to connect to 00:11:22:33:44:55: Connection rejected: busy"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_closed_display() {
        let err = SerialError::ConnectionClosed;
        assert_eq!(err.to_string(), "Device connection closed");
        assert!(err.is_closed());
    }

    #[test]
    fn test_io_becomes_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: SerialError = io.into();
        assert!(matches!(err, SerialError::Transport(TransportError::Io(_))));
        assert!(!err.is_closed());
    }

    #[test]
    fn test_connect_is_transparent() {
        let err: SerialError =
            ConnectError::new("AA", TransportError::not_found("AA")).into();
        assert_eq!(err.to_string(), "Failed to connect to AA: Device not found: AA");
    }
}
