//! Line-framed text connections over Bluetooth RFCOMM.
//!
//! This library turns a duplex byte channel (an RFCOMM serial device node, a
//! TCP bridge or an in-memory pipe) into a connection that sends encoded text
//! and yields newline-delimited inbound messages.
//!
//! # Modules
//!
//! - `registry`: One live connection per address, single-flight open
//! - `connection`: Serialized send, line stream, raw access and close
//! - `listener`: Callback adapter with one slot per event kind
//! - `executor`: Where listener callbacks run
//! - `transport`: Byte channel, connector and device enumeration traits
//! - `codec` / `encoding`: Line framing and character sets
//! - `config`: Configuration management with TOML support
//! - `logging`: `tracing` subscriber setup for binaries
//!
//! # Example
//!
//! ```no_run
//! use bt_serial::{ConnectionRegistry, TcpConnector};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ConnectionRegistry::new(Arc::new(TcpConnector::new()));
//! let connection = registry.open("127.0.0.1:7000").await?;
//!
//! connection.send("hello\n").await?;
//! let mut messages = connection.message_stream()?;
//! if let Some(reply) = messages.next().await {
//!     println!("{}", reply?);
//! }
//!
//! registry.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod encoding;
pub mod error;
pub mod executor;
pub mod listener;
pub mod logging;
pub mod registry;
pub mod transport;

// Re-export commonly used types for convenience
pub use codec::LineCodec;
pub use connection::{MessageStream, RawInput, RawOutput, SerialConnection};
pub use encoding::{Encoding, UnknownEncoding};
pub use error::{ConnectError, SerialError};
pub use executor::{callback_queue, CallbackExecutor, CallbackLoop, CallbackQueue, InlineExecutor};
pub use listener::{ListenerAdapter, OnError, OnMessageReceived, OnMessageSent};
pub use registry::{ConnectionRegistry, ConnectionTarget};
pub use transport::{
    BoxedTransport, DeviceEnumerator, MockConnector, PairedDevice, StaticDeviceList, TcpConnector,
    Transport, TransportConnector, TransportError,
};

#[cfg(feature = "serial")]
pub use transport::{SerialPortConnector, SerialPortEnumerator, SerialSettings};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
