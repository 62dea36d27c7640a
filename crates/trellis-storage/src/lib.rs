//! Trellis Storage — key-value persistence and the project-record boundary.
//!
//! Two concerns live here:
//!
//! # Raw key-value ([`KvStore`])
//!
//! Byte-level `get`/`set`/`delete` with namespace isolation. Each service
//! instance receives a [`ScopedKvStore`] pre-bound to `project:{id}`;
//! scripts cannot reach each other's data.
//!
//! # Project records ([`ProjectStore`])
//!
//! The collaborator boundary from the runtime's point of view: project
//! slug mapping, the running/stopped flag, and the active release artifact.
//! The runtime reads records at `Start` and writes back only the running
//! flag to reflect crash/stop outcomes. Everything else about projects
//! (versioning, branching, ownership) belongs to the collaborator that
//! implements this trait against its own database.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;
pub mod projects;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};
pub use projects::{MemoryProjectStore, ProjectRecord, ProjectStore, ReleaseArtifact};
