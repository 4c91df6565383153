//! Transport abstraction layer.
//!
//! Provides the duplex byte channel trait, the connection-establishment and
//! device-enumeration collaborators, and their implementations.

pub mod error;
pub mod mock;
pub mod tcp;
pub mod traits;

// Serial device nodes (/dev/rfcommN and friends)
#[cfg(feature = "serial")]
pub mod serial_port;

pub use error::TransportError;
pub use mock::{MockConnector, MockPeer};
pub use tcp::TcpConnector;
pub use traits::*;

#[cfg(feature = "serial")]
pub use serial_port::{SerialPortConnector, SerialPortEnumerator, SerialSettings};
