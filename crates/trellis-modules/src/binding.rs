//! Per-instance capability state and the registry that produces it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

use trellis_core::script_abi::{BootManifest, LogLevel};
use trellis_core::{HandlerId, ProjectId};
use trellis_storage::kv::{KvStore, ScopedKvStore};
use trellis_storage::projects::ProjectRecord;

use crate::error::{ModuleError, ModuleResult};

/// Default timeout applied to outbound HTTP requests made by scripts.
const OUTBOUND_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sink for log lines emitted by a script through the log capability.
///
/// Implemented by the runtime's per-instance log buffer; lines also flow to
/// `tracing` inside the host function itself.
pub trait InstanceLog: Send + Sync {
    /// Append one line at the given level.
    fn append(&self, level: LogLevel, message: &str);
}

/// Why a delayed-task submission was refused.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Every pool slot is taken and the submit deadline passed.
    #[error("worker pool saturated")]
    Saturated,
    /// The executor is shutting down or otherwise unreachable.
    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

/// Accepts delayed-task submissions from a script handler.
///
/// Bound to one instance; the implementation carries the project context.
pub trait DelayedSubmitter: Send + Sync {
    /// Queue the handler for background execution.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Saturated`] if no pool slot frees up before the
    /// submit deadline.
    fn submit(&self, handler: HandlerId) -> Result<(), SubmitError>;
}

/// Why a plugin call failed.
#[derive(Debug, Error)]
pub enum PluginCallError {
    /// No loaded plugin exposes the named function.
    #[error("unknown plugin function {plugin}::{function}")]
    Unknown {
        /// Plugin name as requested by the script.
        plugin: String,
        /// Function name as requested by the script.
        function: String,
    },
    /// The plugin was found but its invocation failed.
    #[error("plugin call failed: {0}")]
    Failed(String),
}

/// Dispatches script calls into dynamically loaded plugins.
pub trait PluginDispatch: Send + Sync {
    /// Invoke `function` on `plugin` with a JSON payload, returning the
    /// plugin's JSON reply.
    ///
    /// # Errors
    ///
    /// [`PluginCallError::Unknown`] if nothing matches,
    /// [`PluginCallError::Failed`] if the plugin traps or errors.
    fn call(&self, plugin: &str, function: &str, payload: &str)
    -> Result<String, PluginCallError>;

    /// Announce a new sandbox for `project` to every loaded plugin.
    ///
    /// Runs once per instance binding, before the script's boot callback.
    /// Implementations log their own failures; a plugin that cannot take
    /// the announcement never blocks the instance.
    fn register_module(&self, project: &str) {
        let _ = project;
    }
}

/// A [`PluginDispatch`] with nothing loaded. Every call is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlugins;

impl PluginDispatch for NoPlugins {
    fn call(
        &self,
        plugin: &str,
        function: &str,
        _payload: &str,
    ) -> Result<String, PluginCallError> {
        Err(PluginCallError::Unknown {
            plugin: plugin.to_owned(),
            function: function.to_owned(),
        })
    }
}

/// Shared state behind every host function of one instance.
///
/// Lives inside `UserData<HostState>`; Extism hands each host function a
/// locked view. Scoping happens here, once, at bind time: the key-value
/// handle is namespaced, the files root is per-project, and env and goals
/// are plain copies the script cannot write back through.
pub struct HostState {
    /// Owning project.
    pub project_id: ProjectId,
    /// Root directory for the files capability. Paths never escape it.
    pub files_root: PathBuf,
    /// Key-value handle bound to `project:{id}`.
    pub kv: ScopedKvStore,
    /// Environment variables from the project record.
    pub env: HashMap<String, String>,
    /// Read-only goal values from the project record.
    pub goals: HashMap<String, serde_json::Value>,
    /// Destination for script log lines.
    pub log: Arc<dyn InstanceLog>,
    /// Delayed-task intake for this instance.
    pub tasks: Arc<dyn DelayedSubmitter>,
    /// Plugin call dispatch.
    pub plugins: Arc<dyn PluginDispatch>,
    /// Outbound HTTP client, shared across instances.
    pub http: reqwest::Client,
    /// Handle used to bridge async storage calls from sync host functions.
    pub runtime_handle: Handle,
    /// Registrations collected while the boot callback runs.
    pub manifest: BootManifest,
    /// Set once boot completes; late registrations are rejected.
    pub sealed: bool,
}

impl HostState {
    /// Close the registration window and take what the script registered.
    pub fn seal(&mut self) -> BootManifest {
        self.sealed = true;
        std::mem::take(&mut self.manifest)
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("project_id", &self.project_id)
            .field("files_root", &self.files_root)
            .field("sealed", &self.sealed)
            .field("routes", &self.manifest.routes.len())
            .field("jobs", &self.manifest.jobs.len())
            .finish_non_exhaustive()
    }
}

/// Produces scoped [`HostState`] values for new instances.
///
/// One registry per process; it owns the shared backends (key-value store,
/// HTTP client, plugin dispatch) and the files area under the data
/// directory.
pub struct ModuleRegistry {
    kv: Arc<dyn KvStore>,
    files_root: PathBuf,
    plugins: Arc<dyn PluginDispatch>,
    http: reqwest::Client,
}

impl ModuleRegistry {
    /// Create a registry rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Fails if the files area cannot be created or the HTTP client cannot
    /// be built.
    pub fn new(
        kv: Arc<dyn KvStore>,
        data_dir: &Path,
        plugins: Arc<dyn PluginDispatch>,
    ) -> ModuleResult<Self> {
        let files_root = data_dir.join("projects");
        std::fs::create_dir_all(&files_root).map_err(|source| ModuleError::FilesRoot {
            path: files_root.clone(),
            source,
        })?;
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            kv,
            files_root,
            plugins,
            http,
        })
    }

    /// Swap the plugin dispatch, e.g. once plugin discovery has run.
    pub fn set_plugins(&mut self, plugins: Arc<dyn PluginDispatch>) {
        self.plugins = plugins;
    }

    /// Bind the capability modules to one project, producing the state its
    /// host functions will share.
    ///
    /// # Errors
    ///
    /// Fails if the per-project files directory cannot be created or no
    /// tokio runtime is current.
    pub fn bind(
        &self,
        record: &ProjectRecord,
        log: Arc<dyn InstanceLog>,
        tasks: Arc<dyn DelayedSubmitter>,
    ) -> ModuleResult<HostState> {
        let files_root = self.files_root.join(record.id.as_str()).join("files");
        std::fs::create_dir_all(&files_root).map_err(|source| ModuleError::FilesRoot {
            path: files_root.clone(),
            source,
        })?;

        let namespace = format!("project:{}", record.id.as_str());
        let kv = ScopedKvStore::new(self.kv.clone(), namespace);
        let runtime_handle = Handle::try_current().map_err(|_| ModuleError::NoRuntime)?;

        self.plugins.register_module(record.id.as_str());

        debug!(project = %record.id, "bound capability modules");

        Ok(HostState {
            project_id: record.id.clone(),
            files_root,
            kv,
            env: record.env.clone(),
            goals: record.goals.clone(),
            log,
            tasks,
            plugins: self.plugins.clone(),
            http: self.http.clone(),
            runtime_handle,
            manifest: BootManifest::default(),
            sealed: false,
        })
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("files_root", &self.files_root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::ProjectSlug;
    use trellis_storage::kv::MemoryKvStore;

    struct DropLog;
    impl InstanceLog for DropLog {
        fn append(&self, _level: LogLevel, _message: &str) {}
    }

    struct RejectAll;
    impl DelayedSubmitter for RejectAll {
        fn submit(&self, _handler: HandlerId) -> Result<(), SubmitError> {
            Err(SubmitError::Saturated)
        }
    }

    fn record(id: &str) -> ProjectRecord {
        ProjectRecord {
            id: ProjectId::from_static(id),
            slug: ProjectSlug::from_static(id),
            running: false,
            release: None,
            env: HashMap::from([("API_URL".to_owned(), "https://example.test".to_owned())]),
            goals: HashMap::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bind_scopes_kv_and_files_per_project() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModuleRegistry::new(
            Arc::new(MemoryKvStore::new()),
            dir.path(),
            Arc::new(NoPlugins),
        )
        .unwrap();

        let a = registry
            .bind(&record("alpha"), Arc::new(DropLog), Arc::new(RejectAll))
            .unwrap();
        let b = registry
            .bind(&record("bravo"), Arc::new(DropLog), Arc::new(RejectAll))
            .unwrap();

        assert_eq!(a.kv.namespace(), "project:alpha");
        assert_eq!(b.kv.namespace(), "project:bravo");
        assert_ne!(a.files_root, b.files_root);
        assert!(a.files_root.is_dir());
        assert_eq!(a.env.get("API_URL").unwrap(), "https://example.test");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn seal_takes_manifest_and_closes_window() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModuleRegistry::new(
            Arc::new(MemoryKvStore::new()),
            dir.path(),
            Arc::new(NoPlugins),
        )
        .unwrap();
        let mut state = registry
            .bind(&record("alpha"), Arc::new(DropLog), Arc::new(RejectAll))
            .unwrap();

        state
            .manifest
            .routes
            .push(trellis_core::script_abi::RouteRegistration {
                method: "GET".into(),
                path: "/ping".into(),
                handler: HandlerId(0),
            });

        let manifest = state.seal();
        assert_eq!(manifest.routes.len(), 1);
        assert!(state.sealed);
        assert!(state.manifest.routes.is_empty());
    }

    #[test]
    fn no_plugins_rejects_everything() {
        let err = NoPlugins.call("weather", "current", "{}").unwrap_err();
        assert!(matches!(err, PluginCallError::Unknown { .. }));
    }

    struct RecordingDispatch {
        announced: std::sync::Mutex<Vec<String>>,
    }

    impl PluginDispatch for RecordingDispatch {
        fn call(
            &self,
            plugin: &str,
            function: &str,
            _payload: &str,
        ) -> Result<String, PluginCallError> {
            Err(PluginCallError::Unknown {
                plugin: plugin.to_owned(),
                function: function.to_owned(),
            })
        }

        fn register_module(&self, project: &str) {
            self.announced.lock().unwrap().push(project.to_owned());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bind_announces_each_new_sandbox_to_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let dispatch = Arc::new(RecordingDispatch {
            announced: std::sync::Mutex::new(Vec::new()),
        });
        let registry =
            ModuleRegistry::new(Arc::new(MemoryKvStore::new()), dir.path(), dispatch.clone())
                .unwrap();

        registry
            .bind(&record("alpha"), Arc::new(DropLog), Arc::new(RejectAll))
            .unwrap();
        registry
            .bind(&record("bravo"), Arc::new(DropLog), Arc::new(RejectAll))
            .unwrap();

        assert_eq!(*dispatch.announced.lock().unwrap(), ["alpha", "bravo"]);
    }
}
