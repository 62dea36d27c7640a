//! One live service instance and its lifecycle.
//!
//! Boot and start are driven by the manager through [`boot_instance`] and
//! [`BootedInstance::start`], keeping the two phases separable so
//! autostart can boot a whole wave before any start callback runs. After
//! start the instance is immutable apart from its state channel; router,
//! scheduler, and executor all reach the sandbox through
//! [`enter_sandbox`], which owns the deadline and panic handling for
//! every entry.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use extism::UserData;
use tokio::sync::watch;
use tracing::{info, warn};

use trellis_core::script_abi::{HandlerInvocation, InvocationKind, RouteRequest, RouteResponse};
use trellis_core::{HandlerId, InstanceState, ProjectId, ProjectSlug, TriggerSpec};
use trellis_modules::ModuleRegistry;
use trellis_storage::projects::ProjectRecord;

use crate::engine::{EngineError, EngineFactory, SandboxLimits, ScriptEngine, SharedEngine};
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::{InstanceSubmitter, TaskTarget};
use crate::logsink::LogBuffer;
use crate::router::RouteTable;

/// Deadlines for each kind of sandbox entry.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTimeouts {
    /// Boot callback deadline.
    pub boot: Duration,
    /// Start callback deadline.
    pub start: Duration,
    /// Shutdown callback deadline; overrunning it forces teardown.
    pub shutdown: Duration,
    /// Per route-handler invocation deadline.
    pub request: Duration,
    /// Per job/task invocation deadline.
    pub job: Duration,
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        Self {
            boot: Duration::from_secs(10),
            start: Duration::from_secs(10),
            shutdown: Duration::from_secs(10),
            request: Duration::from_secs(30),
            job: Duration::from_secs(60),
        }
    }
}

impl LifecycleTimeouts {
    /// The sandbox-level hard backstop: longer than every orchestrator
    /// deadline, so the orchestrator always times out first and an
    /// abandoned blocking thread still gets freed.
    #[must_use]
    pub fn hard_call_timeout(&self) -> Duration {
        self.boot
            .max(self.start)
            .max(self.shutdown)
            .max(self.request)
            .max(self.job)
            .saturating_add(Duration::from_secs(1))
    }
}

/// Result of a stop: whether the shutdown callback had to be abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// True when the shutdown callback overran its deadline and teardown
    /// was forced.
    pub timed_out: bool,
}

/// Run one closure inside the sandbox under a deadline.
///
/// This is the only way anything enters a sandbox after construction.
/// Takes the instance lock on a blocking thread; a deadline overrun
/// abandons that thread (the sandbox's own hard timeout eventually frees
/// it) and a panic inside the guest surfaces as an invocation error, not
/// a process fault.
pub(crate) async fn enter_sandbox<R, F>(
    engine: SharedEngine,
    deadline: Duration,
    phase: &'static str,
    f: F,
) -> RuntimeResult<R>
where
    R: Send + 'static,
    F: FnOnce(&mut dyn ScriptEngine) -> Result<R, EngineError> + Send + 'static,
{
    let joined = tokio::time::timeout(
        deadline,
        tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
            f(guard.as_mut())
        }),
    )
    .await;

    match joined {
        Err(_) => Err(RuntimeError::Timeout { phase, deadline }),
        Ok(Err(join_err)) if join_err.is_panic() => {
            Err(RuntimeError::Invocation(format!("{phase} panicked")))
        },
        Ok(Err(_)) => Err(RuntimeError::Invocation(format!("{phase} was cancelled"))),
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(RuntimeError::Invocation(e.to_string())),
    }
}

/// Build the sandbox for a project and run its boot callback.
///
/// On success the returned [`BootedInstance`] holds the sealed, validated
/// registrations; nothing is published yet. Any failure leaves the state
/// channel at Crashed and releases everything.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn boot_instance(
    modules: &ModuleRegistry,
    factory: &dyn EngineFactory,
    submitter: Arc<InstanceSubmitter>,
    log: Arc<LogBuffer>,
    timeouts: LifecycleTimeouts,
    max_memory_bytes: u64,
    record: &ProjectRecord,
    wasm: &[u8],
    version: String,
) -> RuntimeResult<BootedInstance> {
    log.clear();

    let host_state = modules.bind(record, log.clone(), submitter.clone())?;
    let user_data = UserData::new(host_state);

    let limits = SandboxLimits {
        max_memory_bytes,
        hard_call_timeout: timeouts.hard_call_timeout(),
    };
    let engine = factory
        .create(wasm, user_data.clone(), &limits)
        .map_err(|e| RuntimeError::BootFailure(e.to_string()))?;
    let engine: SharedEngine = Arc::new(Mutex::new(engine));

    let (state_tx, state_rx) = watch::channel(InstanceState::Booting);
    submitter.arm(TaskTarget {
        engine: engine.clone(),
        state: state_rx,
        log: log.clone(),
        timeout: timeouts.job,
    });

    info!(project = %record.id, version = %version, "booting instance");
    if let Err(e) =
        enter_sandbox(engine.clone(), timeouts.boot, "boot", |engine| engine.boot()).await
    {
        state_tx.send_replace(InstanceState::Crashed);
        return Err(match e {
            RuntimeError::Invocation(message) => RuntimeError::BootFailure(message),
            other => other,
        });
    }

    // Close the registration window and take what boot registered.
    let manifest = {
        let ud = user_data
            .get()
            .map_err(|e| RuntimeError::BootFailure(format!("host state unavailable: {e}")))?;
        let mut state = ud
            .lock()
            .map_err(|e| RuntimeError::BootFailure(format!("host state poisoned: {e}")))?;
        state.seal()
    };

    let routes = match RouteTable::build(&manifest.routes) {
        Ok(table) => Arc::new(table),
        Err(message) => {
            state_tx.send_replace(InstanceState::Crashed);
            return Err(RuntimeError::Configuration(message));
        },
    };
    let mut jobs = Vec::with_capacity(manifest.jobs.len());
    for job in &manifest.jobs {
        match TriggerSpec::parse(&job.spec) {
            Ok(spec) => jobs.push((spec, job.handler)),
            Err(e) => {
                state_tx.send_replace(InstanceState::Crashed);
                return Err(RuntimeError::Configuration(e.to_string()));
            },
        }
    }

    Ok(BootedInstance {
        project: record.id.clone(),
        slug: record.slug.clone(),
        version,
        engine,
        state_tx,
        log,
        routes,
        jobs,
        timeouts,
    })
}

/// An instance that finished boot but has not run its start callback.
pub(crate) struct BootedInstance {
    project: ProjectId,
    slug: ProjectSlug,
    version: String,
    engine: SharedEngine,
    state_tx: watch::Sender<InstanceState>,
    log: Arc<LogBuffer>,
    routes: Arc<RouteTable>,
    jobs: Vec<(TriggerSpec, HandlerId)>,
    timeouts: LifecycleTimeouts,
}

impl BootedInstance {
    pub(crate) fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Run the start callback and promote to Running.
    pub(crate) async fn start(self) -> RuntimeResult<Arc<ServiceInstance>> {
        if let Err(e) = enter_sandbox(
            self.engine.clone(),
            self.timeouts.start,
            "start",
            |engine| engine.start(),
        )
        .await
        {
            self.state_tx.send_replace(InstanceState::Crashed);
            return Err(match e {
                RuntimeError::Invocation(message) => RuntimeError::StartFailure(message),
                other => other,
            });
        }

        self.state_tx.send_replace(InstanceState::Running);
        info!(
            project = %self.project,
            version = %self.version,
            routes = self.routes.len(),
            jobs = self.jobs.len(),
            "instance running"
        );
        Ok(Arc::new(ServiceInstance {
            project: self.project,
            slug: self.slug,
            version: self.version,
            engine: self.engine,
            state_tx: self.state_tx,
            log: self.log,
            routes: self.routes,
            jobs: self.jobs,
            timeouts: self.timeouts,
            started_at: Utc::now(),
        }))
    }
}

/// A running service instance.
pub struct ServiceInstance {
    project: ProjectId,
    slug: ProjectSlug,
    version: String,
    engine: SharedEngine,
    state_tx: watch::Sender<InstanceState>,
    log: Arc<LogBuffer>,
    routes: Arc<RouteTable>,
    jobs: Vec<(TriggerSpec, HandlerId)>,
    timeouts: LifecycleTimeouts,
    started_at: DateTime<Utc>,
}

impl ServiceInstance {
    /// Owning project id.
    #[must_use]
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// URL slug the instance is mounted under.
    #[must_use]
    pub fn slug(&self) -> &ProjectSlug {
        &self.slug
    }

    /// Active release version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// When the instance reached Running.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<InstanceState> {
        self.state_tx.subscribe()
    }

    /// The instance's log buffer.
    #[must_use]
    pub fn log(&self) -> Arc<LogBuffer> {
        self.log.clone()
    }

    /// Compiled route table.
    #[must_use]
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.clone()
    }

    /// Jobs registered during boot.
    #[must_use]
    pub fn jobs(&self) -> &[(TriggerSpec, HandlerId)] {
        &self.jobs
    }

    /// Claim the right to tear this instance down.
    ///
    /// Exactly one caller wins; everyone else observes the teardown on
    /// the watch channel.
    pub(crate) fn begin_shutdown(&self) -> bool {
        self.state_tx.send_if_modified(|state| match state {
            InstanceState::Booting | InstanceState::Running => {
                *state = InstanceState::ShuttingDown;
                true
            },
            InstanceState::Stopped | InstanceState::ShuttingDown | InstanceState::Crashed => false,
        })
    }

    /// Run the shutdown callback and settle the terminal state.
    ///
    /// A shutdown overrun forces teardown and is reported as a
    /// timeout-flagged success, never an error; a script fault during
    /// shutdown is logged and the instance still stops.
    pub(crate) async fn run_shutdown(&self) -> StopOutcome {
        let result = enter_sandbox(
            self.engine.clone(),
            self.timeouts.shutdown,
            "shutdown",
            |engine| engine.shutdown(),
        )
        .await;

        match result {
            Ok(()) => {
                self.state_tx.send_replace(InstanceState::Stopped);
                StopOutcome { timed_out: false }
            },
            Err(RuntimeError::Timeout { .. }) => {
                warn!(project = %self.project, "shutdown overran its deadline, forcing teardown");
                self.state_tx.send_replace(InstanceState::Crashed);
                StopOutcome { timed_out: true }
            },
            Err(e) => {
                warn!(project = %self.project, error = %e, "shutdown callback failed");
                self.state_tx.send_replace(InstanceState::Stopped);
                StopOutcome { timed_out: false }
            },
        }
    }

    /// Invoke a route handler under the request deadline.
    ///
    /// # Errors
    ///
    /// Timeout or invocation failure; fatal only to this call.
    pub async fn invoke_route(
        &self,
        handler: HandlerId,
        request: RouteRequest,
    ) -> RuntimeResult<RouteResponse> {
        let invocation = HandlerInvocation {
            handler,
            kind: InvocationKind::Route,
            request: Some(request),
        };
        let response = enter_sandbox(
            self.engine.clone(),
            self.timeouts.request,
            "route handler",
            move |engine| engine.invoke(&invocation),
        )
        .await?;
        response
            .ok_or_else(|| RuntimeError::Invocation("route handler returned no response".into()))
    }

    /// Invoke a job handler under the job deadline.
    ///
    /// # Errors
    ///
    /// Timeout or invocation failure; the job stays scheduled either way.
    pub async fn invoke_job(&self, handler: HandlerId) -> RuntimeResult<()> {
        let invocation = HandlerInvocation {
            handler,
            kind: InvocationKind::Job,
            request: None,
        };
        enter_sandbox(
            self.engine.clone(),
            self.timeouts.job,
            "job handler",
            move |engine| engine.invoke(&invocation),
        )
        .await
        .map(|_| ())
    }
}

impl std::fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("project", &self.project)
            .field("slug", &self.slug)
            .field("version", &self.version)
            .field("state", &self.state())
            .field("routes", &self.routes.len())
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}
