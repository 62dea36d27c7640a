//! The sandbox seam.
//!
//! [`ScriptEngine`] is everything the orchestration core needs from a
//! loaded script: the three lifecycle entry points and handler dispatch.
//! Production uses [`WasmEngine`] on Extism; tests drive the same
//! machinery with scripted engines, no compiled WASM required.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use extism::{Manifest, PluginBuilder, UserData, Wasm};
use thiserror::Error;

use trellis_core::script_abi::{HandlerInvocation, InvocationKind, RouteResponse};
use trellis_modules::{HostState, register_host_functions};

/// A script-visible failure inside the sandbox.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(String);

impl EngineError {
    /// Wrap a failure message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Resource limits applied to one sandbox.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Maximum WASM linear memory in bytes.
    pub max_memory_bytes: u64,
    /// Hard per-call backstop inside the sandbox. The orchestrator's own
    /// per-phase deadlines are shorter; this bound frees the blocked
    /// thread if a call outlives its abandonment.
    pub hard_call_timeout: Duration,
}

/// One loaded script, entered through its exports.
///
/// Calls are blocking; callers hold the instance lock and run on
/// `spawn_blocking`. Engines are `Send` so the lock can travel between
/// blocking threads, but never shared without it.
pub trait ScriptEngine: Send {
    /// Run the guest's `boot` export. Registrations are collected by the
    /// host functions while this runs.
    ///
    /// # Errors
    ///
    /// Any guest trap or missing export.
    fn boot(&mut self) -> Result<(), EngineError>;

    /// Run the guest's `start` export, if it has one.
    ///
    /// # Errors
    ///
    /// Any guest trap.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Run the guest's `shutdown` export, if it has one.
    ///
    /// # Errors
    ///
    /// Any guest trap.
    fn shutdown(&mut self) -> Result<(), EngineError>;

    /// Dispatch one handler invocation. Route invocations return the
    /// script's response; job and task invocations return `None`.
    ///
    /// # Errors
    ///
    /// Any guest trap or an unparseable route response.
    fn invoke(&mut self, invocation: &HandlerInvocation)
    -> Result<Option<RouteResponse>, EngineError>;
}

/// The engine shared between router, scheduler, and executor. This mutex
/// is the per-instance serialization point.
pub type SharedEngine = Arc<Mutex<Box<dyn ScriptEngine>>>;

/// Builds engines for new instances. The seam tests swap out.
pub trait EngineFactory: Send + Sync {
    /// Build an engine for the given release bytes and capability binding.
    ///
    /// # Errors
    ///
    /// Invalid WASM or a sandbox build failure.
    fn create(
        &self,
        wasm: &[u8],
        user_data: UserData<HostState>,
        limits: &SandboxLimits,
    ) -> Result<Box<dyn ScriptEngine>, EngineError>;
}

/// The production [`ScriptEngine`] on Extism.
pub struct WasmEngine {
    plugin: extism::Plugin,
}

impl WasmEngine {
    /// Load `wasm` into a fresh sandbox with the capability surface bound.
    ///
    /// # Errors
    ///
    /// Invalid WASM or a sandbox build failure.
    pub fn new(
        wasm: &[u8],
        user_data: UserData<HostState>,
        limits: &SandboxLimits,
    ) -> Result<Self, EngineError> {
        let mut manifest =
            Manifest::new([Wasm::data(wasm.to_vec())]).with_timeout(limits.hard_call_timeout);
        // WASM pages are 64KB each
        let pages = limits.max_memory_bytes / (64 * 1024);
        manifest = manifest.with_memory_max(u32::try_from(pages).unwrap_or(u32::MAX));

        let builder = PluginBuilder::new(manifest).with_wasi(true);
        let builder = register_host_functions(builder, user_data);
        let plugin = builder
            .build()
            .map_err(|e| EngineError::new(format!("failed to build sandbox: {e}")))?;

        Ok(Self { plugin })
    }

    fn call_optional(&mut self, export: &str) -> Result<(), EngineError> {
        if !self.plugin.function_exists(export) {
            return Ok(());
        }
        self.plugin
            .call::<&str, Vec<u8>>(export, "")
            .map(|_| ())
            .map_err(|e| EngineError::new(format!("{export} failed: {e}")))
    }
}

impl ScriptEngine for WasmEngine {
    fn boot(&mut self) -> Result<(), EngineError> {
        // boot is mandatory; a script without it cannot register anything
        self.plugin
            .call::<&str, Vec<u8>>("boot", "")
            .map(|_| ())
            .map_err(|e| EngineError::new(format!("boot failed: {e}")))
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.call_optional("start")
    }

    fn shutdown(&mut self) -> Result<(), EngineError> {
        self.call_optional("shutdown")
    }

    fn invoke(
        &mut self,
        invocation: &HandlerInvocation,
    ) -> Result<Option<RouteResponse>, EngineError> {
        let input = serde_json::to_string(invocation)
            .map_err(|e| EngineError::new(format!("failed to encode invocation: {e}")))?;
        let raw = self
            .plugin
            .call::<&str, String>("invoke-handler", &input)
            .map_err(|e| EngineError::new(format!("invoke-handler failed: {e}")))?;

        match invocation.kind {
            InvocationKind::Route => {
                let response: RouteResponse = serde_json::from_str(&raw).map_err(|e| {
                    EngineError::new(format!("unparseable route response: {e}"))
                })?;
                Ok(Some(response))
            },
            InvocationKind::Job | InvocationKind::Task => Ok(None),
        }
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine").finish_non_exhaustive()
    }
}

/// Factory producing [`WasmEngine`] sandboxes.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmEngineFactory;

impl EngineFactory for WasmEngineFactory {
    fn create(
        &self,
        wasm: &[u8],
        user_data: UserData<HostState>,
        limits: &SandboxLimits,
    ) -> Result<Box<dyn ScriptEngine>, EngineError> {
        Ok(Box::new(WasmEngine::new(wasm, user_data, limits)?))
    }
}
