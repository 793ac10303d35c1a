//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration and parameter handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building checks from configuration or request overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid checks file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid definition for '{check}': {reason}")]
    InvalidCheck { check: String, reason: String },

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("unknown parameter '{param}' for '{module}'")]
    UnknownParameter { module: String, param: String },

    #[error("missing parameter '{param}' for '{module}'")]
    MissingParameter { module: String, param: String },

    #[error("invalid value for parameter '{param}': expected {expected}, got {value}")]
    InvalidValue {
        param: String,
        expected: &'static str,
        value: String,
    },

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}
