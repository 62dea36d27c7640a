//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the unreadable file.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse a config file.
    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the malformed file.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A configuration value failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
