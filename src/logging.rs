//! Tracing subscriber setup.
//!
//! All output goes to stderr: in stdio mode stdout carries the protocol.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Error, Result};

/// Build the env filter for the configured level.
///
/// `RUST_LOG` wins over `LOG_LEVEL` when both are set.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = match level.to_ascii_lowercase().as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => level.to_ascii_lowercase(),
        other => return Err(Error::Config(format!("invalid log level '{}'", other))),
    };
    EnvFilter::try_new(format!("cucumberstudio_mcp={level},tower_http={level},warn"))
        .map_err(|e| Error::Config(format!("invalid log filter: {}", e)))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&config.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("Failed to set tracing subscriber: {}", e)))
}
