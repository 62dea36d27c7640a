//! The runtime manager: Start, Stop, Status, Logs, StopAll, Autostart.
//!
//! One manager per process. It owns the live instance map and wires each
//! new instance into the router, the scheduler, and the delayed-task
//! executor. All lifecycle entry points are idempotent in the ways an
//! operator expects: starting a running project fails cleanly, stopping a
//! stopped one fails cleanly, and concurrent stops of the same project
//! both observe the single teardown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use trellis_config::Config;
use trellis_core::script_abi::{RouteRequest, RouteResponse};
use trellis_core::{InstanceState, ProjectId, ProjectSlug};
use trellis_modules::ModuleRegistry;
use trellis_storage::projects::{ProjectRecord, ProjectStore};

use crate::engine::EngineFactory;
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::DelayedExecutor;
use crate::instance::{BootedInstance, LifecycleTimeouts, ServiceInstance, StopOutcome, boot_instance};
use crate::logsink::{LogBuffer, LogLine};
use crate::router::Router;
use crate::scheduler::Scheduler;

/// Tunables for the orchestration core, typically sourced from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Per-phase sandbox deadlines.
    pub timeouts: LifecycleTimeouts,
    /// Maximum WASM linear memory per sandbox, in bytes.
    pub max_memory_bytes: u64,
    /// Delayed-task pool slots, deployment-wide.
    pub pool_size: usize,
    /// How long a task submission waits for a slot.
    pub submit_timeout: Duration,
    /// Scheduler tick interval.
    pub tick_interval: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            timeouts: LifecycleTimeouts::default(),
            max_memory_bytes: 64 * 1024 * 1024,
            pool_size: 5,
            submit_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl RuntimeOptions {
    /// Build options from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeouts: LifecycleTimeouts {
                boot: config.runtime.boot_timeout(),
                start: config.runtime.start_timeout(),
                shutdown: config.runtime.shutdown_timeout(),
                request: config.runtime.request_timeout(),
                job: config.runtime.job_timeout(),
            },
            max_memory_bytes: config.runtime.max_memory_bytes,
            pool_size: config.executor.pool_size,
            submit_timeout: Duration::from_secs(config.executor.submit_timeout_secs),
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs),
        }
    }
}

/// Point-in-time view of one project, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    /// Lifecycle state; `Stopped` when no instance exists.
    pub state: InstanceState,
    /// Active release version, when one is known.
    pub version: Option<String>,
    /// When the live instance reached Running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Owns every live instance and the machinery around them.
pub struct RuntimeManager {
    store: Arc<dyn ProjectStore>,
    modules: ModuleRegistry,
    factory: Box<dyn EngineFactory>,
    executor: DelayedExecutor,
    scheduler: Arc<Scheduler>,
    router: Router,
    instances: DashMap<ProjectId, Arc<ServiceInstance>>,
    starting: DashMap<ProjectId, ()>,
    logs: DashMap<ProjectId, Arc<LogBuffer>>,
    scheduler_shutdown: watch::Sender<bool>,
    options: RuntimeOptions,
}

/// Removes the in-flight start marker on every exit path.
struct StartGuard<'a> {
    map: &'a DashMap<ProjectId, ()>,
    id: ProjectId,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}

impl RuntimeManager {
    /// Assemble the manager from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn ProjectStore>,
        modules: ModuleRegistry,
        factory: Box<dyn EngineFactory>,
        options: RuntimeOptions,
    ) -> Self {
        let (scheduler_shutdown, _) = watch::channel(false);
        Self {
            store,
            modules,
            factory,
            executor: DelayedExecutor::new(options.pool_size, options.submit_timeout),
            scheduler: Arc::new(Scheduler::new(options.tick_interval)),
            router: Router::new(),
            instances: DashMap::new(),
            starting: DashMap::new(),
            logs: DashMap::new(),
            scheduler_shutdown,
            options,
        }
    }

    /// Spawn the scheduler tick loop. Call once, inside a runtime.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        self.scheduler
            .clone()
            .run(self.scheduler_shutdown.subscribe())
    }

    /// Signal the scheduler loop to exit.
    pub fn halt_scheduler(&self) {
        let _ = self.scheduler_shutdown.send(true);
    }

    /// Start a project: boot its active release, run its start callback,
    /// and publish it to the router and scheduler.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AlreadyRunning`] if an instance exists or a start
    /// is already in flight, [`RuntimeError::UnknownProject`] and
    /// [`RuntimeError::NoRelease`] for store misses, and boot/start
    /// failures from the sandbox.
    pub async fn start(&self, id: &ProjectId) -> RuntimeResult<()> {
        if self.instances.contains_key(id) {
            return Err(RuntimeError::AlreadyRunning(id.clone()));
        }
        if self.starting.insert(id.clone(), ()).is_some() {
            return Err(RuntimeError::AlreadyRunning(id.clone()));
        }
        let _guard = StartGuard {
            map: &self.starting,
            id: id.clone(),
        };

        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| RuntimeError::UnknownProject(id.clone()))?;
        let booted = self.boot_for(&record).await?;
        let instance = booted.start().await?;
        self.publish(instance);
        info!(project = %id, "project started");
        Ok(())
    }

    /// Stop a project: unpublish, run its shutdown callback under the
    /// deadline, and tear the sandbox down.
    ///
    /// Exactly one caller drives the teardown; concurrent stops wait for
    /// it and report the same outcome. A shutdown overrun is a success
    /// with `timed_out` set.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotRunning`] when no instance exists.
    pub async fn stop(&self, id: &ProjectId) -> RuntimeResult<StopOutcome> {
        let Some(instance) = self.instances.get(id).map(|e| e.value().clone()) else {
            return Err(RuntimeError::NotRunning(id.clone()));
        };

        if !instance.begin_shutdown() {
            // Someone else is tearing this instance down; observe it.
            let mut state = instance.watch();
            while !state.borrow().is_terminal() {
                if state.changed().await.is_err() {
                    break;
                }
            }
            let crashed = *state.borrow() == InstanceState::Crashed;
            return Ok(StopOutcome { timed_out: crashed });
        }

        self.scheduler.deregister(id);
        self.router.unpublish(instance.slug().as_str());
        let outcome = instance.run_shutdown().await;
        self.instances.remove(id);
        self.flag_stopped(id).await;
        info!(project = %id, timed_out = outcome.timed_out, "project stopped");
        Ok(outcome)
    }

    /// Stop every live instance concurrently.
    pub async fn stop_all(&self) -> Vec<(ProjectId, RuntimeResult<StopOutcome>)> {
        let ids: Vec<ProjectId> = self.instances.iter().map(|e| e.key().clone()).collect();
        let stops = ids.into_iter().map(|id| async move {
            let outcome = self.stop(&id).await;
            (id, outcome)
        });
        join_all(stops).await
    }

    /// Start every project whose stored running flag is set.
    ///
    /// Two waves: boot everything first, then run the start callbacks.
    /// A project that fails either wave is logged, has its running flag
    /// cleared, and never blocks its neighbours. Returns the number of
    /// projects that reached Running.
    pub async fn autostart(&self) -> usize {
        let records = match self.store.list_running().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "autostart could not list projects");
                return 0;
            },
        };

        let mut booted: Vec<BootedInstance> = Vec::new();
        for record in records {
            if self.instances.contains_key(&record.id) {
                continue;
            }
            match self.boot_for(&record).await {
                Ok(b) => booted.push(b),
                Err(e) => {
                    warn!(project = %record.id, error = %e, "autostart boot failed");
                    self.flag_stopped(&record.id).await;
                },
            }
        }

        let mut started = 0;
        for b in booted {
            let project = b.project().clone();
            match b.start().await {
                Ok(instance) => {
                    self.publish(instance);
                    started += 1;
                },
                Err(e) => {
                    warn!(project = %project, error = %e, "autostart start failed");
                    self.flag_stopped(&project).await;
                },
            }
        }
        if started > 0 {
            info!(count = started, "autostart complete");
        }
        started
    }

    /// Report a project's lifecycle state and active release.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownProject`] when no record exists.
    pub async fn status(&self, id: &ProjectId) -> RuntimeResult<ProjectStatus> {
        if let Some(instance) = self.instances.get(id) {
            return Ok(ProjectStatus {
                state: instance.state(),
                version: Some(instance.version().to_owned()),
                started_at: Some(instance.started_at()),
            });
        }
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| RuntimeError::UnknownProject(id.clone()))?;
        Ok(ProjectStatus {
            state: InstanceState::Stopped,
            version: record.release.map(|r| r.version),
            started_at: None,
        })
    }

    /// Page through a project's captured log lines. The buffer survives
    /// Stop; a project that never started has no lines.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownProject`] when no record exists.
    pub async fn logs(
        &self,
        id: &ProjectId,
        offset: u64,
        limit: usize,
    ) -> RuntimeResult<Vec<LogLine>> {
        if let Some(log) = self.logs.get(id) {
            return Ok(log.page(offset, limit));
        }
        if self.store.get(id).await?.is_none() {
            return Err(RuntimeError::UnknownProject(id.clone()));
        }
        Ok(Vec::new())
    }

    /// Dispatch one inbound request to the project mounted at `slug`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownSlug`] for slugs no project owns,
    /// [`RuntimeError::NotRunning`] for known projects with no live
    /// instance, and the router's dispatch errors otherwise.
    pub async fn dispatch(
        &self,
        slug: &str,
        request: RouteRequest,
    ) -> RuntimeResult<RouteResponse> {
        match self.router.dispatch(slug, request).await {
            Err(RuntimeError::UnknownSlug(s)) => {
                let Ok(parsed) = ProjectSlug::new(s.as_str()) else {
                    return Err(RuntimeError::UnknownSlug(s));
                };
                match self.store.find_by_slug(&parsed).await? {
                    Some(id) => Err(RuntimeError::NotRunning(id)),
                    None => Err(RuntimeError::UnknownSlug(s)),
                }
            },
            other => other,
        }
    }

    /// Free delayed-task pool slots right now.
    #[must_use]
    pub fn available_task_slots(&self) -> usize {
        self.executor.available_permits()
    }

    async fn boot_for(&self, record: &ProjectRecord) -> RuntimeResult<BootedInstance> {
        let release = record
            .release
            .clone()
            .ok_or_else(|| RuntimeError::NoRelease(record.id.clone()))?;
        let log = {
            let entry = self.logs.entry(record.id.clone()).or_default();
            Arc::clone(entry.value())
        };
        let submitter = self
            .executor
            .submitter(record.id.clone())
            .map_err(|e| RuntimeError::Invocation(e.to_string()))?;
        boot_instance(
            &self.modules,
            self.factory.as_ref(),
            submitter,
            log,
            self.options.timeouts,
            self.options.max_memory_bytes,
            record,
            &release.wasm,
            release.version,
        )
        .await
    }

    fn publish(&self, instance: Arc<ServiceInstance>) {
        self.instances
            .insert(instance.project().clone(), instance.clone());
        self.router.publish(instance.clone());
        self.scheduler.register(instance);
    }

    async fn flag_stopped(&self, id: &ProjectId) {
        if let Err(e) = self.store.set_running(id, false).await {
            warn!(project = %id, error = %e, "could not persist running flag");
        }
    }
}

impl std::fmt::Debug for RuntimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeManager")
            .field("instances", &self.instances.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use extism::UserData;

    use trellis_modules::{HostState, NoPlugins};
    use trellis_storage::kv::MemoryKvStore;
    use trellis_storage::projects::{MemoryProjectStore, ReleaseArtifact};

    use crate::engine::{EngineError, SandboxLimits, ScriptEngine};
    use trellis_core::script_abi::{HandlerInvocation, RouteResponse};

    struct InertEngine;

    impl ScriptEngine for InertEngine {
        fn boot(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn start(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn shutdown(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn invoke(
            &mut self,
            _invocation: &HandlerInvocation,
        ) -> Result<Option<RouteResponse>, EngineError> {
            Ok(None)
        }
    }

    struct InertFactory;

    impl EngineFactory for InertFactory {
        fn create(
            &self,
            _wasm: &[u8],
            _user_data: UserData<HostState>,
            _limits: &SandboxLimits,
        ) -> Result<Box<dyn ScriptEngine>, EngineError> {
            Ok(Box::new(InertEngine))
        }
    }

    fn record(id: &str, running: bool, with_release: bool) -> ProjectRecord {
        ProjectRecord {
            id: ProjectId::from_static(id),
            slug: ProjectSlug::from_static(id),
            running,
            release: with_release.then(|| ReleaseArtifact {
                version: "v1".into(),
                wasm: vec![0x00, 0x61, 0x73, 0x6d],
            }),
            env: HashMap::new(),
            goals: HashMap::new(),
        }
    }

    async fn manager(dir: &std::path::Path, store: Arc<MemoryProjectStore>) -> RuntimeManager {
        let modules =
            ModuleRegistry::new(Arc::new(MemoryKvStore::new()), dir, Arc::new(NoPlugins)).unwrap();
        RuntimeManager::new(store, modules, Box::new(InertFactory), RuntimeOptions::default())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_unknown_project_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryProjectStore::new());
        let mgr = manager(dir.path(), store).await;

        let result = mgr.start(&ProjectId::from_static("ghost")).await;
        assert!(matches!(result, Err(RuntimeError::UnknownProject(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_without_release_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryProjectStore::new());
        store.upsert(record("alpha", false, false)).await;
        let mgr = manager(dir.path(), store).await;

        let result = mgr.start(&ProjectId::from_static("alpha")).await;
        assert!(matches!(result, Err(RuntimeError::NoRelease(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_start_reports_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryProjectStore::new());
        store.upsert(record("alpha", false, true)).await;
        let mgr = manager(dir.path(), store).await;

        let id = ProjectId::from_static("alpha");
        mgr.start(&id).await.unwrap();
        assert!(matches!(
            mgr.start(&id).await,
            Err(RuntimeError::AlreadyRunning(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_without_instance_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryProjectStore::new());
        store.upsert(record("alpha", false, true)).await;
        let mgr = manager(dir.path(), store).await;

        let result = mgr.stop(&ProjectId::from_static("alpha")).await;
        assert!(matches!(result, Err(RuntimeError::NotRunning(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_reflects_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryProjectStore::new());
        store.upsert(record("alpha", false, true)).await;
        let mgr = manager(dir.path(), store).await;

        let id = ProjectId::from_static("alpha");
        let before = mgr.status(&id).await.unwrap();
        assert_eq!(before.state, InstanceState::Stopped);
        assert_eq!(before.version.as_deref(), Some("v1"));
        assert!(before.started_at.is_none());

        mgr.start(&id).await.unwrap();
        let during = mgr.status(&id).await.unwrap();
        assert_eq!(during.state, InstanceState::Running);
        assert!(during.started_at.is_some());

        let outcome = mgr.stop(&id).await.unwrap();
        assert!(!outcome.timed_out);
        let after = mgr.status(&id).await.unwrap();
        assert_eq!(after.state, InstanceState::Stopped);
    }
}
