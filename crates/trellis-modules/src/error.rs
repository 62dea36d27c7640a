//! Error types for capability binding.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while wiring capability modules to an instance.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The per-project files directory could not be created.
    #[error("failed to prepare files root {path}: {source}")]
    FilesRoot {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The outbound HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Capability binding happened outside a tokio runtime.
    ///
    /// Host functions bridge async storage calls with `Handle::block_on`,
    /// so a handle must be captured at bind time.
    #[error("capability binding requires a running tokio runtime")]
    NoRuntime,
}

/// Convenience result alias for this crate.
pub type ModuleResult<T> = Result<T, ModuleError>;
