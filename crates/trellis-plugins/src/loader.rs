//! Loading a plugin artifact into an Extism sandbox.
//!
//! Load order: read and hash-verify the artifact, build the sandbox with
//! memory and timeout limits, call `init` with the manifest config, then
//! read the function schema. Any failure abandons the plugin.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use extism::{Manifest, PluginBuilder, Wasm};
use serde::Serialize;
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::manifest::PluginManifest;

/// Sandbox limits applied to every plugin.
#[derive(Debug, Clone)]
pub struct PluginLimits {
    /// Maximum WASM linear memory in bytes.
    pub max_memory_bytes: u64,
    /// Maximum execution time per call.
    pub max_execution_time: Duration,
    /// Reject artifacts whose manifest does not pin a hash.
    pub require_hash: bool,
}

impl Default for PluginLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 64 * 1024 * 1024,
            max_execution_time: Duration::from_secs(30),
            require_hash: false,
        }
    }
}

/// Input to a plugin's `invoke` export.
#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    function: &'a str,
    payload: &'a str,
}

/// A plugin loaded into its sandbox and ready to serve calls.
pub struct LoadedPlugin {
    name: String,
    version: String,
    functions: Vec<String>,
    extism: Arc<Mutex<extism::Plugin>>,
}

impl LoadedPlugin {
    /// Plugin name from its manifest.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin version from its manifest.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Functions the plugin declared in its schema.
    #[must_use]
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    /// Whether the plugin serves the named function.
    #[must_use]
    pub fn has_function(&self, function: &str) -> bool {
        self.functions.iter().any(|f| f == function)
    }

    /// Call one of the plugin's declared functions.
    ///
    /// # Errors
    ///
    /// Fails if the sandbox traps, times out, or the lock is poisoned.
    pub fn invoke(&self, function: &str, payload: &str) -> PluginResult<String> {
        let input = serde_json::to_string(&InvokeRequest { function, payload }).map_err(|e| {
            PluginError::InvokeFailed {
                plugin: self.name.clone(),
                function: function.to_owned(),
                message: e.to_string(),
            }
        })?;

        let mut guard = self
            .extism
            .lock()
            .map_err(|e| PluginError::InvokeFailed {
                plugin: self.name.clone(),
                function: function.to_owned(),
                message: format!("plugin lock poisoned: {e}"),
            })?;

        guard
            .call::<&str, String>("invoke", &input)
            .map_err(|e| PluginError::InvokeFailed {
                plugin: self.name.clone(),
                function: function.to_owned(),
                message: e.to_string(),
            })
    }

    /// Call the plugin's `register-module` export for a new sandbox, if it
    /// has one. Failures are logged; the sandbox comes up regardless.
    pub fn register_module(&self, project: &str) {
        let Ok(mut guard) = self.extism.lock() else {
            return;
        };
        if !guard.function_exists("register-module") {
            return;
        }
        let payload = serde_json::json!({ "project": project }).to_string();
        if let Err(e) = guard.call::<&str, Vec<u8>>("register-module", &payload) {
            tracing::warn!(
                plugin = %self.name,
                project,
                error = %e,
                "register-module failed"
            );
        }
    }

    /// Call the plugin's `shutdown` export, if it has one.
    pub fn shutdown(&self) {
        let Ok(mut guard) = self.extism.lock() else {
            return;
        };
        if guard.function_exists("shutdown") {
            if let Err(e) = guard.call::<&str, Vec<u8>>("shutdown", "") {
                tracing::warn!(plugin = %self.name, error = %e, "plugin shutdown failed");
            }
        }
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

/// Load a plugin described by `manifest` from `plugin_dir`.
///
/// # Errors
///
/// Fails on unreadable artifacts, hash mismatches, sandbox build errors,
/// and `init` failures.
pub fn load(
    manifest: &PluginManifest,
    plugin_dir: &Path,
    limits: &PluginLimits,
) -> PluginResult<LoadedPlugin> {
    let artifact_path = if manifest.wasm.path.is_absolute() {
        manifest.wasm.path.clone()
    } else {
        plugin_dir.join(&manifest.wasm.path)
    };

    let wasm_bytes = std::fs::read(&artifact_path).map_err(|e| PluginError::LoadFailed {
        name: manifest.name.clone(),
        message: format!("failed to read {}: {e}", artifact_path.display()),
    })?;

    verify_hash(
        &wasm_bytes,
        manifest.wasm.hash.as_deref(),
        &manifest.name,
        limits.require_hash,
    )?;

    let mut extism_manifest =
        Manifest::new([Wasm::data(wasm_bytes)]).with_timeout(limits.max_execution_time);
    // WASM pages are 64KB each
    let pages = limits.max_memory_bytes / (64 * 1024);
    extism_manifest = extism_manifest.with_memory_max(u32::try_from(pages).unwrap_or(u32::MAX));

    let mut plugin = PluginBuilder::new(extism_manifest)
        .with_wasi(true)
        .build()
        .map_err(|e| PluginError::LoadFailed {
            name: manifest.name.clone(),
            message: format!("failed to build sandbox: {e}"),
        })?;

    initialize(&mut plugin, manifest)?;
    let functions = read_schema(&mut plugin, &manifest.name)?;
    debug!(plugin = %manifest.name, functions = functions.len(), "plugin loaded");

    Ok(LoadedPlugin {
        name: manifest.name.clone(),
        version: manifest.version.clone(),
        functions,
        extism: Arc::new(Mutex::new(plugin)),
    })
}

/// Verify the artifact hash pinned in the manifest, if any.
fn verify_hash(
    wasm_bytes: &[u8],
    expected: Option<&str>,
    name: &str,
    require_hash: bool,
) -> PluginResult<()> {
    match expected {
        Some(expected_hex) => {
            let actual_hex = blake3::hash(wasm_bytes).to_hex().to_string();
            if actual_hex != expected_hex {
                return Err(PluginError::HashMismatch {
                    name: name.to_owned(),
                    expected: expected_hex.to_owned(),
                    actual: actual_hex,
                });
            }
            debug!(plugin = %name, "artifact hash verified");
            Ok(())
        },
        None if require_hash => Err(PluginError::LoadFailed {
            name: name.to_owned(),
            message: "artifact hash required but not pinned in manifest".into(),
        }),
        None => {
            tracing::warn!(plugin = %name, "artifact hash not pinned, integrity not verified");
            Ok(())
        },
    }
}

/// Call the plugin's `init` export with its manifest config.
fn initialize(plugin: &mut extism::Plugin, manifest: &PluginManifest) -> PluginResult<()> {
    if !plugin.function_exists("init") {
        return Ok(());
    }
    let config_json =
        serde_json::to_string(&manifest.config).map_err(|e| PluginError::LoadFailed {
            name: manifest.name.clone(),
            message: format!("failed to serialize config: {e}"),
        })?;
    plugin
        .call::<&str, Vec<u8>>("init", &config_json)
        .map(|_| ())
        .map_err(|e| PluginError::LoadFailed {
            name: manifest.name.clone(),
            message: format!("init failed: {e}"),
        })
}

/// Read the function list from the plugin's `schema` export.
fn read_schema(plugin: &mut extism::Plugin, name: &str) -> PluginResult<Vec<String>> {
    if !plugin.function_exists("schema") {
        tracing::warn!(plugin = %name, "plugin exports no schema, nothing will be callable");
        return Ok(Vec::new());
    }
    let raw = plugin
        .call::<&str, String>("schema", "")
        .map_err(|e| PluginError::LoadFailed {
            name: name.to_owned(),
            message: format!("schema call failed: {e}"),
        })?;
    serde_json::from_str(&raw).map_err(|e| PluginError::LoadFailed {
        name: name.to_owned(),
        message: format!("failed to parse schema output: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verification_match() {
        let data = b"plugin bytes";
        let expected = blake3::hash(data).to_hex().to_string();
        assert!(verify_hash(data, Some(&expected), "weather", false).is_ok());
    }

    #[test]
    fn hash_verification_mismatch() {
        let result = verify_hash(
            b"plugin bytes",
            Some("0000000000000000000000000000000000000000000000000000000000000000"),
            "weather",
            false,
        );
        assert!(matches!(
            result.unwrap_err(),
            PluginError::HashMismatch { .. }
        ));
    }

    #[test]
    fn missing_hash_allowed_unless_required() {
        assert!(verify_hash(b"plugin bytes", None, "weather", false).is_ok());
        assert!(matches!(
            verify_hash(b"plugin bytes", None, "weather", true).unwrap_err(),
            PluginError::LoadFailed { .. }
        ));
    }

    #[test]
    fn missing_artifact_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = PluginManifest {
            name: "ghost".into(),
            version: "0.1.0".into(),
            description: None,
            wasm: crate::manifest::WasmArtifact {
                path: "ghost.wasm".into(),
                hash: None,
            },
            config: std::collections::HashMap::new(),
        };
        let result = load(&manifest, dir.path(), &PluginLimits::default());
        assert!(matches!(
            result.unwrap_err(),
            PluginError::LoadFailed { .. }
        ));
    }
}
