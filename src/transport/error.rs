//! Transport-level error types.
//!
//! Kept separate from the connection-level errors so that connectors and
//! enumerators do not depend on the framing layer.

use thiserror::Error;

/// Errors raised by a transport, a connector or a device enumerator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No device answers at the given address.
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The address could not be parsed by the connector.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// An I/O error occurred on the byte channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connector or device rejected its settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote side or the platform refused the connection.
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// A serialport-specific error occurred.
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl TransportError {
    /// Create a NotFound error from an address.
    pub fn not_found(address: impl Into<String>) -> Self {
        Self::NotFound(address.into())
    }

    /// Create an InvalidAddress error.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Rejected error from a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::not_found("00:11:22:33:44:55");
        assert_eq!(err.to_string(), "Device not found: 00:11:22:33:44:55");

        let err = TransportError::invalid_address("nowhere", "missing port");
        assert_eq!(err.to_string(), "Invalid address 'nowhere': missing port");

        let err = TransportError::rejected("peer busy");
        assert_eq!(err.to_string(), "Connection rejected: peer busy");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.to_string().contains("pipe gone"));
    }
}
