//! Shared vocabulary for the Trellis runtime.
//!
//! Provides the types every other Trellis crate speaks:
//!
//! - [`ProjectId`] / [`ProjectSlug`]: validated project identifiers
//! - [`HandlerId`]: opaque index into a service instance's handler table
//! - [`InstanceState`]: the lifecycle state machine of a service instance
//! - [`script_abi`]: mirror types for the host ↔ script WASM ABI
//!
//! # Handler References
//!
//! Scripts never hold host references and the host never holds script
//! references. A registered route, job, or delayed-task handler is an
//! opaque `u32` index into the owning instance's handler table; the index
//! is meaningless once the instance is torn down.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod id;
pub mod script_abi;
pub mod state;
pub mod trigger;

pub use error::{CoreError, CoreResult};
pub use id::{HandlerId, ProjectId, ProjectSlug};
pub use state::InstanceState;
pub use trigger::{TriggerParseError, TriggerSpec};
