//! Configuration for the `bt-serial` tool and for building a registry.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `BT_SERIAL_CONFIG` environment variable (explicit path)
//! 2. `./bt-serial.toml` (current directory)
//! 3. `~/.config/bt-serial/bt-serial.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\bt-serial\bt-serial.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `BT_SERIAL_<SECTION>_<KEY>`, for example:
//! - `BT_SERIAL_LINK_ENCODING=latin1`
//! - `BT_SERIAL_TRANSPORT_KIND=serial`
//! - `BT_SERIAL_TRANSPORT_BAUD_RATE=115200`
//! - `BT_SERIAL_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```toml
//! [link]
//! encoding = "utf-8"
//!
//! [transport]
//! kind = "serial"
//! baud_rate = 115200
//!
//! [devices.aliases]
//! printer = "/dev/rfcomm0"
//!
//! [[devices.known]]
//! address = "/dev/rfcomm0"
//! name = "Thermal printer"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    Config, DevicesConfig, LinkConfig, LogFormat, LoggingConfig, TransportConfig, TransportKind,
};
