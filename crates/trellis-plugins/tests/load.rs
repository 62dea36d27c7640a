//! End-to-end plugin loading against a real WASM artifact.
//!
//! The fixture is a minimal guest exporting `init`, `schema`, `invoke`,
//! `register-module`, and `shutdown`; its schema declares one callable
//! function and `invoke` answers `ok`.

use std::fs;
use std::path::Path;

use trellis_modules::{PluginCallError, PluginDispatch as _};
use trellis_plugins::{PluginLimits, PluginRegistry};

static ECHO_WASM: &[u8] = include_bytes!("fixtures/echo.wasm");

fn write_echo_plugin(dir: &Path) {
    let plugin_dir = dir.join("echo");
    fs::create_dir(&plugin_dir).unwrap();
    fs::write(plugin_dir.join("echo.wasm"), ECHO_WASM).unwrap();
    let hash = blake3::hash(ECHO_WASM).to_hex().to_string();
    fs::write(
        plugin_dir.join("plugin.toml"),
        format!(
            "name = \"echo\"\nversion = \"0.1.0\"\n\n[wasm]\npath = \"echo.wasm\"\nhash = \"{hash}\"\n"
        ),
    )
    .unwrap();
}

fn write_broken_plugin(dir: &Path) {
    let plugin_dir = dir.join("broken");
    fs::create_dir(&plugin_dir).unwrap();
    fs::write(
        plugin_dir.join("plugin.toml"),
        "name = \"broken\"\nversion = \"0.1.0\"\n\n[wasm]\npath = \"missing.wasm\"\n",
    )
    .unwrap();
}

#[test]
fn well_formed_plugin_loads_beside_a_broken_one() {
    let dir = tempfile::tempdir().unwrap();
    write_echo_plugin(dir.path());
    write_broken_plugin(dir.path());

    let registry = PluginRegistry::load_from_dir(dir.path(), &PluginLimits::default());

    // The broken plugin is skipped; the good one is up and callable.
    assert_eq!(registry.names(), ["echo"]);
    let reply = registry.call("echo", "echo", "{}").unwrap();
    assert_eq!(reply, "ok");

    // Functions outside the declared schema never reach the sandbox.
    let err = registry.call("echo", "undeclared", "{}").unwrap_err();
    assert!(matches!(err, PluginCallError::Unknown { .. }));

    // New-sandbox announcements and process shutdown go through cleanly.
    registry.register_module("alpha");
    registry.shutdown_all();
}
