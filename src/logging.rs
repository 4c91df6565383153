//! `tracing` subscriber setup for the command-line tool.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::filter::EnvFilter;

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the filter: `RUST_LOG` when set, the configured level otherwise.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, InitError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.level)?),
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// received messages.
pub fn init(config: &LoggingConfig) -> Result<(), InitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_from_config_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "bt_serial=debug".to_string(),
            format: LogFormat::Compact,
        };
        let filter = env_filter(&config).unwrap();
        assert!(filter.to_string().contains("bt_serial=debug"));
    }

    #[test]
    #[serial]
    fn test_invalid_level_rejected() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "bt_serial=loud".to_string(),
            format: LogFormat::Json,
        };
        assert!(env_filter(&config).is_err());
    }
}
