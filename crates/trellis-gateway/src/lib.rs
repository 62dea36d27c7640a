//! The Trellis HTTP gateway.
//!
//! Two surfaces on one axum router:
//!
//! - `/r/{slug}/{*path}` — the dynamic entry point. Any method, any path;
//!   the request is handed to the runtime manager, which resolves the slug
//!   to a running instance and its route table. Explicit script responses
//!   pass through status, headers, and body unchanged.
//! - `/api/projects/{id}/…` — the admin lifecycle surface: start, stop,
//!   status, and log paging.
//!
//! The `trellisd` binary in this crate wires the gateway to a configured
//! runtime: config load, telemetry, plugin scan, autostart, and graceful
//! shutdown.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod admin;
pub mod app;
mod dispatch;
pub mod error;

pub use app::{AppState, build_router};
pub use error::ApiError;
