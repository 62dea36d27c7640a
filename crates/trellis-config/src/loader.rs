//! Config file loading with environment overrides.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Load configuration.
///
/// 1. Parse `path` if given and present (a given-but-missing path is an
///    error; `None` skips the file layer entirely).
/// 2. Apply `TRELLIS_*` environment overrides.
/// 3. Validate.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is unreadable or malformed, or if
/// the final configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadError {
                path: p.display().to_string(),
                source: e,
            })?;
            let parsed: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: p.display().to_string(),
                source: e,
            })?;
            info!(path = %p.display(), "Loaded configuration file");
            parsed
        },
        None => {
            debug!("No configuration file given, using defaults");
            Config::default()
        },
    };

    apply_env_overrides(&mut config)?;
    validate::validate(&config)?;
    Ok(config)
}

/// Apply `TRELLIS_*` environment variable overrides to a parsed config.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(addr) = std::env::var("TRELLIS_LISTEN_ADDR") {
        config.gateway.listen_addr = addr;
    }
    if let Ok(dir) = std::env::var("TRELLIS_DATA_DIR") {
        config.storage.data_dir = dir.into();
    }
    if let Ok(dir) = std::env::var("TRELLIS_PLUGIN_DIR") {
        config.plugins.dir = dir.into();
    }
    if let Ok(size) = std::env::var("TRELLIS_POOL_SIZE") {
        config.executor.pool_size = size
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("TRELLIS_POOL_SIZE: {e}")))?;
    }
    if let Ok(level) = std::env::var("TRELLIS_LOG") {
        config.logging.level = level;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_without_file_uses_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.executor.pool_size, 5);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let result = load(Some(Path::new("/nonexistent/trellis.toml")));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn load_parses_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\nboot_timeout_secs = 3").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.runtime.boot_timeout_secs, 3);
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime\nboot_timeout_secs = 3").unwrap();
        let result = load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
