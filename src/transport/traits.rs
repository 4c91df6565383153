//! Core traits for the transport abstraction.
//!
//! A transport is nothing more than a duplex byte channel. Connection
//! establishment and device enumeration are collaborators supplied by the
//! platform, so the framing layer can run equally over RFCOMM, TCP, a serial
//! device node or an in-memory pipe.

use super::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// An opaque duplex byte channel.
///
/// Reading and writing map onto `AsyncRead` / `AsyncWrite`; closing is a
/// best-effort `shutdown` followed by dropping the value.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Owned, type-erased transport handed to a connection.
pub type BoxedTransport = Box<dyn Transport>;

/// Establishes byte channels to remote addresses.
///
/// Every failure is reported as a `TransportError`; the registry wraps it
/// into a connect failure without inspecting it further.
#[async_trait]
pub trait TransportConnector: Send + Sync + fmt::Debug {
    /// Open a duplex channel to `address`.
    async fn connect(&self, address: &str) -> Result<BoxedTransport, TransportError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// A remote endpoint already known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    /// Address accepted by the matching connector.
    pub address: String,
    /// Human-readable name, when the platform reports one.
    #[serde(default)]
    pub name: Option<String>,
}

impl PairedDevice {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }
}

impl fmt::Display for PairedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.address, name),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Read-only view of the devices paired with this host.
pub trait DeviceEnumerator: Send + Sync + fmt::Debug {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>, TransportError>;
}

/// Enumerator backed by a fixed list, usually taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceList {
    devices: Vec<PairedDevice>,
}

impl StaticDeviceList {
    pub fn new(devices: Vec<PairedDevice>) -> Self {
        Self { devices }
    }
}

impl DeviceEnumerator for StaticDeviceList {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>, TransportError> {
        Ok(self.devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_device_list() {
        let list = StaticDeviceList::new(vec![
            PairedDevice::new("00:11:22:33:44:55", Some("HC-05".to_string())),
            PairedDevice::new("66:77:88:99:AA:BB", None),
        ]);

        let devices = list.paired_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name.as_deref(), Some("HC-05"));
    }

    #[test]
    fn test_paired_device_display() {
        let named = PairedDevice::new("00:11:22:33:44:55", Some("HC-05".to_string()));
        assert_eq!(named.to_string(), "00:11:22:33:44:55 (HC-05)");

        let anonymous = PairedDevice::new("66:77:88:99:AA:BB", None);
        assert_eq!(anonymous.to_string(), "66:77:88:99:AA:BB");
    }

    #[test]
    fn test_boxed_duplex_is_transport() {
        let (a, _b) = tokio::io::duplex(64);
        let boxed: BoxedTransport = Box::new(a);
        drop(boxed);
    }
}
