//! Configuration types for the Trellis runtime.
//!
//! Self-contained: no dependencies on other internal trellis crates. Every
//! struct implements [`Default`] with production defaults so that a bare
//! `[section]` header in TOML produces a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the Trellis runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP gateway settings.
    pub gateway: GatewaySection,
    /// Instance lifecycle timeouts and sandbox limits.
    pub runtime: RuntimeSection,
    /// Scheduler tick behaviour.
    pub scheduler: SchedulerSection,
    /// Bounded delayed-task executor.
    pub executor: ExecutorSection,
    /// Plugin discovery and verification.
    pub plugins: PluginsSection,
    /// Data directory layout.
    pub storage: StorageSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Socket address the gateway binds, e.g. `"127.0.0.1:8080"`.
    pub listen_addr: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_owned(),
        }
    }
}

/// Instance lifecycle timeouts and per-sandbox resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Deadline for the boot callback, in seconds.
    pub boot_timeout_secs: u64,
    /// Deadline for the start callback, in seconds.
    pub start_timeout_secs: u64,
    /// Deadline for the shutdown callback, in seconds. Overrunning it
    /// forces teardown.
    pub shutdown_timeout_secs: u64,
    /// Deadline for a single route handler invocation, in seconds.
    pub request_timeout_secs: u64,
    /// Deadline for a single job or delayed-task invocation, in seconds.
    pub job_timeout_secs: u64,
    /// Maximum WASM linear memory per sandbox, in bytes.
    pub max_memory_bytes: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            boot_timeout_secs: 10,
            start_timeout_secs: 10,
            shutdown_timeout_secs: 10,
            request_timeout_secs: 30,
            job_timeout_secs: 60,
            max_memory_bytes: 64 * 1024 * 1024,
        }
    }
}

impl RuntimeSection {
    /// Boot deadline as a [`Duration`].
    #[must_use]
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    /// Start deadline as a [`Duration`].
    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Shutdown deadline as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Per-request deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Per-job/task deadline as a [`Duration`].
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Scheduler tick behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Tick loop interval, in seconds. Cron specs resolve at minute
    /// granularity regardless.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
        }
    }
}

/// Bounded delayed-task executor. Deployment-wide, not per-project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Number of concurrent delayed-task slots.
    pub pool_size: usize,
    /// How long a submission blocks waiting for a slot before failing
    /// with a saturation error, in seconds.
    pub submit_timeout_secs: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            pool_size: 5,
            submit_timeout_secs: 5,
        }
    }
}

/// Plugin discovery and verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    /// Directory scanned for plugin subdirectories at startup.
    pub dir: PathBuf,
    /// Reject plugin artifacts whose manifest does not pin a blake3 hash.
    pub require_hash: bool,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plugins"),
            require_hash: false,
        }
    }
}

/// Data directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Root under which per-project file storage and KV data live.
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".trellis"),
        }
    }
}

/// Logging level, format, and per-crate directives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter, e.g. `"info"`.
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, or `"json"`.
    pub format: String,
    /// Extra per-target directives, e.g. `["trellis_runtime=debug"]`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.executor.pool_size, 5);
        assert_eq!(config.runtime.boot_timeout_secs, 10);
        assert_eq!(config.gateway.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    fn bare_section_headers_yield_defaults() {
        let config: Config = toml::from_str("[runtime]\n[executor]\n").unwrap();
        assert_eq!(config.runtime.request_timeout_secs, 30);
        assert_eq!(config.executor.submit_timeout_secs, 5);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[executor]\npool_size = 12\n").unwrap();
        assert_eq!(config.executor.pool_size, 12);
        assert_eq!(config.executor.submit_timeout_secs, 5);
    }

    #[test]
    fn timeout_accessors_convert_to_durations() {
        let section = RuntimeSection::default();
        assert_eq!(section.boot_timeout(), Duration::from_secs(10));
        assert_eq!(section.request_timeout(), Duration::from_secs(30));
    }
}
