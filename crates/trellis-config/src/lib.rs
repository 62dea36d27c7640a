//! Trellis Config - deployment configuration for the Trellis runtime.
//!
//! Configuration is loaded from a TOML file with environment variable
//! overrides. Every section defaults to working values, so a missing file
//! or a bare `[section]` header still produces a runnable configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! # fn main() -> Result<(), trellis_config::ConfigError> {
//! let config = trellis_config::load(Some(std::path::Path::new("trellis.toml")))?;
//! println!("listening on {}", config.gateway.listen_addr);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::load;
pub use types::{
    Config, ExecutorSection, GatewaySection, LoggingSection, PluginsSection, RuntimeSection,
    SchedulerSection, StorageSection,
};
