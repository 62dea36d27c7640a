//! Plugin discovery and loading.
//!
//! Plugins extend the capability surface scripts can reach through the
//! plugin-call host function. Each plugin ships as a directory containing a
//! `plugin.toml` manifest and a WASM artifact; the registry scans the
//! configured plugins directory at startup, verifies artifact hashes,
//! initializes each plugin with its manifest config, and exposes the
//! functions the plugin declares in its schema.
//!
//! A plugin that fails to load is logged and skipped; it never prevents the
//! runtime from starting.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod discovery;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod registry;

pub use error::{PluginError, PluginResult};
pub use loader::{LoadedPlugin, PluginLimits};
pub use manifest::{PluginManifest, WasmArtifact};
pub use registry::PluginRegistry;
