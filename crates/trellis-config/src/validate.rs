//! Semantic validation of the merged configuration.

use std::net::SocketAddr;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully loaded configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] describing the first violated rule.
pub(crate) fn validate(config: &Config) -> ConfigResult<()> {
    if config.gateway.listen_addr.parse::<SocketAddr>().is_err() {
        return Err(ConfigError::Invalid(format!(
            "gateway.listen_addr is not a socket address: {}",
            config.gateway.listen_addr
        )));
    }
    if config.executor.pool_size == 0 {
        return Err(ConfigError::Invalid(
            "executor.pool_size must be at least 1".into(),
        ));
    }
    if config.scheduler.tick_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "scheduler.tick_interval_secs must be at least 1".into(),
        ));
    }
    for (name, value) in [
        ("runtime.boot_timeout_secs", config.runtime.boot_timeout_secs),
        ("runtime.start_timeout_secs", config.runtime.start_timeout_secs),
        (
            "runtime.shutdown_timeout_secs",
            config.runtime.shutdown_timeout_secs,
        ),
        (
            "runtime.request_timeout_secs",
            config.runtime.request_timeout_secs,
        ),
        ("runtime.job_timeout_secs", config.runtime.job_timeout_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
        }
    }
    match config.logging.format.as_str() {
        "pretty" | "compact" | "json" => {},
        other => {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be pretty, compact, or json, got: {other}"
            )));
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut config = Config::default();
        config.executor.pool_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn bad_listen_addr_is_rejected() {
        let mut config = Config::default();
        config.gateway.listen_addr = "not-an-address".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_lifecycle_timeout_is_rejected() {
        let mut config = Config::default();
        config.runtime.shutdown_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(validate(&config).is_err());
    }
}
