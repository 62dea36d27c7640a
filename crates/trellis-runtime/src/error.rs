//! The runtime error taxonomy.
//!
//! Lifecycle failures (`BootFailure`, `StartFailure`, lifecycle `Timeout`)
//! tear their instance down and never cross to other instances. Dispatch
//! failures (`RouteNotFound`, `Invocation`, per-call `Timeout`) are fatal
//! only to the call that raised them.

use std::time::Duration;

use thiserror::Error;

use trellis_core::ProjectId;
use trellis_modules::ModuleError;
use trellis_storage::error::StorageError;

/// Errors surfaced by the orchestration core.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No project record exists for this id.
    #[error("unknown project {0}")]
    UnknownProject(ProjectId),

    /// No project is mounted at this slug.
    #[error("unknown project slug {0:?}")]
    UnknownSlug(String),

    /// The project exists but has never published a release.
    #[error("project {0} has no published release")]
    NoRelease(ProjectId),

    /// Start was called while an instance already exists.
    #[error("project {0} is already running")]
    AlreadyRunning(ProjectId),

    /// Stop or dispatch hit a project with no live instance.
    #[error("project {0} is not running")]
    NotRunning(ProjectId),

    /// The boot callback failed; the instance never reached Running.
    #[error("boot failed: {0}")]
    BootFailure(String),

    /// The start callback failed; the instance never reached Running.
    #[error("start failed: {0}")]
    StartFailure(String),

    /// A registration collected during boot did not validate.
    #[error("invalid registration: {0}")]
    Configuration(String),

    /// A sandbox entry exceeded its deadline.
    #[error("{phase} exceeded its {deadline:?} deadline")]
    Timeout {
        /// Which sandbox entry timed out.
        phase: &'static str,
        /// The deadline that was exceeded.
        deadline: Duration,
    },

    /// A handler invocation failed inside the sandbox.
    #[error("handler invocation failed: {0}")]
    Invocation(String),

    /// The instance is running but no route matches.
    #[error("no route matches")]
    RouteNotFound,

    /// Project store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Capability binding failure.
    #[error(transparent)]
    Modules(#[from] ModuleError),
}

/// Convenience result alias for this crate.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
