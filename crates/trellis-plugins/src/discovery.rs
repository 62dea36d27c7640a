//! Plugin manifest discovery.
//!
//! Scans the plugins directory for subdirectories containing a
//! `plugin.toml`. Errors in individual manifests are logged as warnings
//! and do not prevent other manifests from loading.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PluginError, PluginResult};
use crate::manifest::PluginManifest;

/// Standard plugin manifest file name.
pub const MANIFEST_FILE_NAME: &str = "plugin.toml";

/// Load all plugin manifests under `dir`.
///
/// Returns `(manifest, plugin_dir)` pairs; relative artifact paths resolve
/// against `plugin_dir`.
///
/// # Errors
///
/// Fails only if the directory itself cannot be read.
pub fn load_manifests_from_dir(dir: &Path) -> PluginResult<Vec<(PluginManifest, PathBuf)>> {
    let mut manifests = Vec::new();

    let entries = std::fs::read_dir(dir).map_err(|e| PluginError::ManifestParse {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| PluginError::ManifestParse {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let manifest_path = path.join(MANIFEST_FILE_NAME);
        if !manifest_path.exists() {
            continue;
        }

        match load_manifest(&manifest_path) {
            Ok(manifest) => {
                debug!(
                    path = %manifest_path.display(),
                    plugin = %manifest.name,
                    "loaded plugin manifest"
                );
                manifests.push((manifest, path));
            },
            Err(e) => {
                warn!(
                    path = %manifest_path.display(),
                    error = %e,
                    "skipping unreadable plugin manifest"
                );
            },
        }
    }

    Ok(manifests)
}

/// Load a single plugin manifest from a TOML file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub fn load_manifest(path: &Path) -> PluginResult<PluginManifest> {
    let content = std::fs::read_to_string(path).map_err(|e| PluginError::ManifestParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    toml::from_str(&content).map_err(|e| PluginError::ManifestParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_manifest_toml() -> &'static str {
        r#"
name = "weather"
version = "0.2.0"

[wasm]
path = "weather.wasm"
"#
    }

    #[test]
    fn loads_manifests_from_subdirectories() {
        let dir = TempDir::new().unwrap();
        let plugin_dir = dir.path().join("weather");
        std::fs::create_dir(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join(MANIFEST_FILE_NAME), sample_manifest_toml()).unwrap();

        let results = load_manifests_from_dir(dir.path()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.name, "weather");
        assert_eq!(results[0].1, plugin_dir);
    }

    #[test]
    fn invalid_manifests_are_skipped() {
        let dir = TempDir::new().unwrap();

        let valid = dir.path().join("valid");
        std::fs::create_dir(&valid).unwrap();
        std::fs::write(valid.join(MANIFEST_FILE_NAME), sample_manifest_toml()).unwrap();

        let invalid = dir.path().join("invalid");
        std::fs::create_dir(&invalid).unwrap();
        std::fs::write(invalid.join(MANIFEST_FILE_NAME), "not valid toml {{{{").unwrap();

        let results = load_manifests_from_dir(dir.path()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.name, "weather");
    }

    #[test]
    fn directories_without_manifests_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), "not a plugin").unwrap();

        let results = load_manifests_from_dir(dir.path()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn missing_manifest_file_is_an_error() {
        let result = load_manifest(Path::new("/nonexistent/plugin.toml"));
        assert!(matches!(
            result.unwrap_err(),
            PluginError::ManifestParse { .. }
        ));
    }
}
