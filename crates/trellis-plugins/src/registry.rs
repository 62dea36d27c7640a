//! The process-wide plugin registry.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use trellis_modules::{PluginCallError, PluginDispatch};

use crate::discovery;
use crate::loader::{self, LoadedPlugin, PluginLimits};

/// All plugins loaded for this process, keyed by name.
///
/// Built once at startup; scripts reach it through [`PluginDispatch`].
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, LoadedPlugin>,
}

impl PluginRegistry {
    /// An empty registry with nothing loaded.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan `dir` and load every plugin found there.
    ///
    /// Plugins that fail to load are logged and skipped. A missing
    /// directory yields an empty registry.
    #[must_use]
    pub fn load_from_dir(dir: &Path, limits: &PluginLimits) -> Self {
        let mut plugins = HashMap::new();

        if !dir.is_dir() {
            debug!(path = %dir.display(), "plugins directory absent, nothing to load");
            return Self { plugins };
        }

        let manifests = match discovery::load_manifests_from_dir(dir) {
            Ok(found) => found,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to scan plugins directory");
                return Self { plugins };
            },
        };

        for (manifest, plugin_dir) in manifests {
            match loader::load(&manifest, &plugin_dir, limits) {
                Ok(plugin) => {
                    if plugins.contains_key(plugin.name()) {
                        warn!(plugin = %plugin.name(), "duplicate plugin name, keeping the first");
                        continue;
                    }
                    info!(
                        plugin = %plugin.name(),
                        version = %plugin.version(),
                        functions = plugin.functions().len(),
                        "plugin loaded"
                    );
                    plugins.insert(plugin.name().to_owned(), plugin);
                },
                Err(e) => {
                    warn!(plugin = %manifest.name, error = %e, "skipping plugin");
                },
            }
        }

        info!(count = plugins.len(), "plugin scan complete");
        Self { plugins }
    }

    /// Number of loaded plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Names of all loaded plugins, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Call every plugin's `shutdown` export, best effort.
    pub fn shutdown_all(&self) {
        for plugin in self.plugins.values() {
            plugin.shutdown();
        }
    }
}

impl PluginDispatch for PluginRegistry {
    fn call(
        &self,
        plugin: &str,
        function: &str,
        payload: &str,
    ) -> Result<String, PluginCallError> {
        let Some(loaded) = self.plugins.get(plugin) else {
            return Err(PluginCallError::Unknown {
                plugin: plugin.to_owned(),
                function: function.to_owned(),
            });
        };
        if !loaded.has_function(function) {
            return Err(PluginCallError::Unknown {
                plugin: plugin.to_owned(),
                function: function.to_owned(),
            });
        }
        loaded
            .invoke(function, payload)
            .map_err(|e| PluginCallError::Failed(e.to_string()))
    }

    fn register_module(&self, project: &str) {
        for plugin in self.plugins.values() {
            plugin.register_module(project);
        }
    }
}
