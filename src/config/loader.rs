//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat, TransportKind};
use crate::encoding::Encoding;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "BT_SERIAL";

/// Config file name
const CONFIG_FILE_NAME: &str = "bt-serial.toml";

/// Application directory under the platform config dir
const APP_DIR_NAME: &str = "bt-serial";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "BT_SERIAL_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `BT_SERIAL_CONFIG` environment variable (explicit path)
    /// 2. `./bt-serial.toml` (current directory)
    /// 3. `~/.config/bt-serial/bt-serial.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\bt-serial\bt-serial.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values. The result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if let Err(e) = apply_env_overrides(&mut config) {
            tracing::warn!(error = %e, "ignoring environment override");
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("No config file path set".to_string()))?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.validate()?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> (String, Option<String>) {
    let var = format!("{}_{}", ENV_PREFIX, key);
    let value = std::env::var(&var).ok();
    (var, value)
}

fn parse_env<T: FromStr>(var: &str, value: &str, message: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(var, message))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern `BT_SERIAL_<SECTION>_<KEY>`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Link overrides
    if let (var, Some(val)) = env_var("LINK_ENCODING") {
        config.link.encoding = Encoding::from_str(val.trim())
            .map_err(|e| ConfigError::env_parse(var, e.to_string()))?;
    }
    if let (var, Some(val)) = env_var("LINK_READ_BUFFER_CAPACITY") {
        config.link.read_buffer_capacity = parse_env(&var, &val, "Invalid buffer capacity")?;
    }

    // Transport overrides
    if let (var, Some(val)) = env_var("TRANSPORT_KIND") {
        config.transport.kind = match val.trim().to_lowercase().as_str() {
            "tcp" => TransportKind::Tcp,
            "serial" => TransportKind::Serial,
            _ => return Err(ConfigError::env_parse(var, "Expected 'tcp' or 'serial'")),
        };
    }
    if let (var, Some(val)) = env_var("TRANSPORT_BAUD_RATE") {
        config.transport.baud_rate = parse_env(&var, &val, "Invalid baud rate")?;
    }
    if let (var, Some(val)) = env_var("TRANSPORT_CONNECT_TIMEOUT_MS") {
        config.transport.connect_timeout_ms = parse_env(&var, &val, "Invalid timeout")?;
    }
    if let (var, Some(val)) = env_var("TRANSPORT_SEND_TIMEOUT_MS") {
        config.transport.send_timeout_ms = parse_env(&var, &val, "Invalid timeout")?;
    }
    if let (_, Some(val)) = env_var("TRANSPORT_TCP_NODELAY") {
        config.transport.tcp_nodelay = val.to_lowercase() == "true" || val == "1";
    }

    // Logging overrides
    if let (_, Some(val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let (var, Some(val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = match val.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    var,
                    "Expected 'json', 'pretty' or 'compact'",
                ))
            }
        };
    }

    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}
