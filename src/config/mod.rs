mod schema;

pub use schema::*;

use std::path::Path;
use thiserror::Error;

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "athena-monitor.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    if config.monitor.heartbeat_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "monitor.heartbeat_interval_ms must be greater than zero".into(),
        ));
    }
    Ok(config)
}
