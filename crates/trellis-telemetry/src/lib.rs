//! Trellis Telemetry - logging and tracing for the Trellis runtime.
//!
//! # Example
//!
//! ```rust,no_run
//! use trellis_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), trellis_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("trellis_runtime=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("runtime starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, setup_default_logging, setup_logging};
