//! Capability modules exposed to sandboxed scripts.
//!
//! Scripts run inside an Extism WASM sandbox with no ambient authority.
//! Everything they can do — log, read env, touch the key-value store, make
//! HTTP requests, register routes and jobs — goes through a host function
//! registered here, and every host function is scoped to the owning project
//! at bind time.
//!
//! The [`ModuleRegistry`] is the single place instances are wired up: it
//! produces a [`HostState`] per instance and [`host::register_host_functions`]
//! attaches the function table to the plugin builder.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod binding;
pub mod error;
pub mod host;

pub use binding::{
    DelayedSubmitter, HostState, InstanceLog, ModuleRegistry, NoPlugins, PluginCallError,
    PluginDispatch, SubmitError,
};
pub use error::{ModuleError, ModuleResult};
pub use host::register_host_functions;
