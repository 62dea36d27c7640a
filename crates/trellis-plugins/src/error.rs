//! Error types for plugin loading and invocation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while discovering, loading, or calling plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A `plugin.toml` could not be read or parsed.
    #[error("failed to read plugin manifest {path}: {message}")]
    ManifestParse {
        /// Manifest file path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The plugin artifact could not be loaded or initialized.
    #[error("failed to load plugin {name}: {message}")]
    LoadFailed {
        /// Plugin name from its manifest.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// The WASM artifact does not match the hash pinned in the manifest.
    #[error("plugin {name} artifact hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Plugin name from its manifest.
        name: String,
        /// Hash pinned in the manifest.
        expected: String,
        /// Hash of the artifact on disk.
        actual: String,
    },

    /// A call into a loaded plugin failed.
    #[error("plugin {plugin} call {function} failed: {message}")]
    InvokeFailed {
        /// Plugin name.
        plugin: String,
        /// Function the script asked for.
        function: String,
        /// What went wrong.
        message: String,
    },
}

/// Convenience result alias for this crate.
pub type PluginResult<T> = Result<T, PluginError>;
