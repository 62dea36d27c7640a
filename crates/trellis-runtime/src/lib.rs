//! The Trellis orchestration core.
//!
//! Turns a project's published WASM release into a live, lifecycle-managed
//! service instance:
//!
//! - [`RuntimeManager`] — Start/Stop/Status/Logs, StopAll, Autostart
//! - [`ScriptEngine`] — the sandbox seam; [`WasmEngine`] is the Extism
//!   implementation, tests supply scripted engines
//! - [`Router`] — per-project route tables and HTTP dispatch
//! - [`Scheduler`] — interval and cron jobs on a single tick loop
//! - [`DelayedExecutor`] — the bounded delayed-task pool
//! - [`LogBuffer`] — per-instance append-only log ring
//!
//! The concurrency contract: one instance, one sandbox, one lock. Router,
//! scheduler, and executor all enter the sandbox through the same
//! `Arc<Mutex<Box<dyn ScriptEngine>>>` on `spawn_blocking`, so a single
//! instance never runs two handlers at once while distinct instances stay
//! fully concurrent.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod engine;
pub mod error;
pub mod executor;
pub mod instance;
pub mod logsink;
pub mod manager;
pub mod router;
pub mod scheduler;

pub use engine::{
    EngineError, EngineFactory, SandboxLimits, ScriptEngine, WasmEngine, WasmEngineFactory,
};
pub use error::{RuntimeError, RuntimeResult};
pub use executor::DelayedExecutor;
pub use instance::{LifecycleTimeouts, ServiceInstance, StopOutcome};
pub use logsink::{LogBuffer, LogLine};
pub use manager::{ProjectStatus, RuntimeManager, RuntimeOptions};
pub use router::{RouteTable, Router};
pub use scheduler::Scheduler;
