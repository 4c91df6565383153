//! Serial device backend using tokio-serial.
//!
//! On Linux a bound RFCOMM channel shows up as `/dev/rfcommN`; this connector
//! opens such nodes (or any other tty) and the enumerator lists them.
//!
//! Note: This module is gated behind the `serial` feature flag.

use super::error::TransportError;
use super::traits::{BoxedTransport, DeviceEnumerator, PairedDevice, TransportConnector};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Line settings applied when opening a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate (ignored by the RFCOMM tty driver but required by the API).
    pub baud_rate: u32,
    /// Blocking timeout used by the underlying port.
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Opens serial device nodes as transports.
#[derive(Debug, Clone, Default)]
pub struct SerialPortConnector {
    settings: SerialSettings,
}

impl SerialPortConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TransportConnector for SerialPortConnector {
    async fn connect(&self, address: &str) -> Result<BoxedTransport, TransportError> {
        if self.settings.baud_rate == 0 {
            return Err(TransportError::config("baud rate must be non-zero"));
        }

        let builder =
            tokio_serial::new(address, self.settings.baud_rate).timeout(self.settings.timeout);

        let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice => TransportError::not_found(address),
            tokio_serial::ErrorKind::InvalidInput => TransportError::config(e.to_string()),
            _ => TransportError::Serial(e),
        })?;

        debug!(%address, baud = self.settings.baud_rate, "serial channel opened");
        Ok(Box::new(stream))
    }

    fn name(&self) -> &str {
        "serial"
    }
}

/// Lists serial device nodes known to the operating system.
#[derive(Debug, Clone, Default)]
pub struct SerialPortEnumerator {
    bluetooth_only: bool,
}

impl SerialPortEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report Bluetooth-backed ports.
    pub fn bluetooth_only(mut self, bluetooth_only: bool) -> Self {
        self.bluetooth_only = bluetooth_only;
        self
    }
}

impl DeviceEnumerator for SerialPortEnumerator {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>, TransportError> {
        let ports = serialport::available_ports()?;

        Ok(ports
            .into_iter()
            .filter(|port| !self.bluetooth_only || is_bluetooth(port))
            .map(|port| {
                let name = match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb) => usb.product.clone(),
                    serialport::SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
                    _ => None,
                };
                PairedDevice::new(port.port_name, name)
            })
            .collect())
    }
}

fn is_bluetooth(port: &serialport::SerialPortInfo) -> bool {
    matches!(port.port_type, serialport::SerialPortType::BluetoothPort)
        || port.port_name.contains("rfcomm")
}
