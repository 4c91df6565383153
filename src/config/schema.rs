//! Configuration schema definitions.
//!
//! Every section has defaults, so a partial file (or none at all) is valid.

use super::error::{ConfigError, ConfigResult};
use crate::connection::DEFAULT_READ_BUFFER_CAPACITY;
use crate::encoding::Encoding;
use crate::transport::PairedDevice;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Framing and text encoding of connections
    pub link: LinkConfig,
    /// How connections are established
    pub transport: TransportConfig,
    /// Address aliases and known devices
    pub devices: DevicesConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values serde cannot reject on its own.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.link.read_buffer_capacity == 0 {
            return Err(ConfigError::validation(
                "link.read_buffer_capacity",
                "must be greater than zero",
            ));
        }
        if self.transport.baud_rate == 0 {
            return Err(ConfigError::validation(
                "transport.baud_rate",
                "must be greater than zero",
            ));
        }
        if let Some((alias, _)) = self
            .devices
            .aliases
            .iter()
            .find(|(_, target)| target.trim().is_empty())
        {
            return Err(ConfigError::validation(
                format!("devices.aliases.{}", alias),
                "alias target is empty",
            ));
        }
        Ok(())
    }
}

/// Link section: per-connection defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Encoding used by `ConnectionRegistry::open`
    pub encoding: Encoding,
    /// Initial size of the inbound framing buffer in bytes
    pub read_buffer_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
        }
    }
}

/// Which connector establishes connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// `host:port` stream, e.g. a serial-over-TCP bridge
    #[default]
    Tcp,
    /// Serial device node such as `/dev/rfcomm0`
    Serial,
}

/// Transport section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Baud rate for serial device nodes
    pub baud_rate: u32,
    /// Disable Nagle on TCP connections
    pub tcp_nodelay: bool,
    /// Connect timeout applied by the CLI, in milliseconds
    pub connect_timeout_ms: u64,
    /// Send timeout applied by the CLI, in milliseconds
    pub send_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Tcp,
            baud_rate: 9600,
            tcp_nodelay: true,
            connect_timeout_ms: 10_000,
            send_timeout_ms: 5_000,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Devices section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Friendly name -> address
    pub aliases: HashMap<String, String>,
    /// Devices listed by the static enumerator
    pub known: Vec<PairedDevice>,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset, e.g. "info" or "bt_serial=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.link.encoding, Encoding::Utf8);
        assert_eq!(config.transport.kind, TransportKind::Tcp);
        assert_eq!(config.transport.baud_rate, 9600);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[link]"));
        assert!(toml_str.contains("[transport]"));
        assert!(toml_str.contains("encoding = \"utf-8\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [link]
            encoding = "latin1"

            [transport]
            kind = "serial"
            baud_rate = 115200

            [[devices.known]]
            address = "/dev/rfcomm0"
            name = "Scale"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.link.encoding, Encoding::Latin1);
        assert_eq!(config.transport.kind, TransportKind::Serial);
        assert_eq!(config.transport.baud_rate, 115200);
        assert_eq!(config.devices.known.len(), 1);
        assert_eq!(config.devices.known[0].name.as_deref(), Some("Scale"));
        // Defaults should still work
        assert_eq!(config.link.read_buffer_capacity, DEFAULT_READ_BUFFER_CAPACITY);
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let result: Result<Config, _> = toml::from_str("[link]\nencoding = \"ebcdic\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let mut config = Config::default();
        config.transport.baud_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref key, .. }) if key == "transport.baud_rate"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_alias() {
        let mut config = Config::default();
        config
            .devices
            .aliases
            .insert("ghost".to_string(), " ".to_string());
        assert!(config.validate().is_err());
    }
}
