//! Plugin manifest types.
//!
//! A `plugin.toml` describes a plugin's identity, its WASM artifact, and
//! the configuration handed to its `init` export.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A plugin manifest loaded from `plugin.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name; scripts address functions as `<name>.<function>`.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The WASM artifact to load.
    pub wasm: WasmArtifact,
    /// Configuration passed as JSON to the plugin's `init` export.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, serde_json::Value>,
}

/// Location and integrity pin of a plugin's WASM artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasmArtifact {
    /// Path to the `.wasm` file, relative to the plugin directory.
    pub path: PathBuf,
    /// Optional blake3 hex digest for integrity verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_from_toml() {
        let manifest: PluginManifest = toml::from_str(
            r#"
name = "weather"
version = "0.2.0"
description = "Weather lookups"

[wasm]
path = "weather.wasm"
hash = "deadbeef"

[config]
api_base = "https://api.example.test"
retries = 3
"#,
        )
        .unwrap();

        assert_eq!(manifest.name, "weather");
        assert_eq!(manifest.wasm.path, PathBuf::from("weather.wasm"));
        assert_eq!(manifest.wasm.hash.as_deref(), Some("deadbeef"));
        assert_eq!(manifest.config["retries"], serde_json::json!(3));
    }

    #[test]
    fn hash_and_config_are_optional() {
        let manifest: PluginManifest = toml::from_str(
            r#"
name = "counter"
version = "1.0.0"

[wasm]
path = "counter.wasm"
"#,
        )
        .unwrap();

        assert!(manifest.wasm.hash.is_none());
        assert!(manifest.config.is_empty());
    }
}
