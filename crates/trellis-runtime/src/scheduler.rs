//! The job scheduler: one tick loop for every instance's jobs.
//!
//! Each registered job carries its own next-fire time. On every tick the
//! loop collects the jobs that came due, advances their next-fire from
//! the current time (missed windows are skipped, not replayed), and
//! invokes each one through the owning instance. A failing or overrunning
//! job stays scheduled; the next tick fires it again on schedule.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use trellis_core::{HandlerId, ProjectId, TriggerSpec};

use crate::instance::ServiceInstance;

struct JobSlot {
    spec: TriggerSpec,
    handler: HandlerId,
    next_fire: DateTime<Utc>,
}

struct Entry {
    instance: Arc<ServiceInstance>,
    jobs: Vec<JobSlot>,
}

/// Fires registered jobs when their triggers come due.
pub struct Scheduler {
    entries: Mutex<HashMap<ProjectId, Entry>>,
    tick: Duration,
}

impl Scheduler {
    /// Create a scheduler that checks for due jobs every `tick`.
    #[must_use]
    pub fn new(tick: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            tick: tick.max(Duration::from_millis(10)),
        }
    }

    /// Register a running instance's jobs. First fire is one full trigger
    /// period after now, never immediately.
    pub fn register(&self, instance: Arc<ServiceInstance>) {
        let now = Utc::now();
        let mut jobs = Vec::with_capacity(instance.jobs().len());
        for (spec, handler) in instance.jobs() {
            match spec.next_after(now) {
                Some(next_fire) => jobs.push(JobSlot {
                    spec: spec.clone(),
                    handler: *handler,
                    next_fire,
                }),
                None => warn!(
                    project = %instance.project(),
                    handler = handler.0,
                    spec = %spec,
                    "trigger never fires, job not scheduled"
                ),
            }
        }
        if jobs.is_empty() {
            return;
        }
        debug!(project = %instance.project(), jobs = jobs.len(), "jobs scheduled");
        let project = instance.project().clone();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(project, Entry { instance, jobs });
    }

    /// Drop a project's jobs. Called during Stop before the shutdown
    /// callback runs, so no new firing can race the teardown.
    pub fn deregister(&self, project: &ProjectId) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(project);
    }

    /// Number of projects with scheduled jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the tick loop until `shutdown` flips to true.
    pub fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.tick_once(Utc::now()),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("scheduler loop stopping");
                            return;
                        }
                    },
                }
            }
        })
    }

    /// One pass: fire everything due at `now` and advance its slot.
    fn tick_once(&self, now: DateTime<Utc>) {
        let due = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let mut due = Vec::new();
            for entry in entries.values_mut() {
                for handler in collect_due(&mut entry.jobs, now) {
                    due.push((entry.instance.clone(), handler));
                }
            }
            due
        };

        for (instance, handler) in due {
            tokio::spawn(async move {
                // A stop may have begun after this firing was collected;
                // the teardown owns the engine from here on.
                if !instance.state().is_running() {
                    debug!(
                        project = %instance.project(),
                        handler = handler.0,
                        "instance no longer running, job skipped"
                    );
                    return;
                }
                if let Err(e) = instance.invoke_job(handler).await {
                    warn!(
                        project = %instance.project(),
                        handler = handler.0,
                        error = %e,
                        "scheduled job failed"
                    );
                }
            });
        }
    }
}

/// Pull the due handlers out of `jobs` and advance each slot past `now`.
/// Slots whose trigger can never fire again are dropped.
fn collect_due(jobs: &mut Vec<JobSlot>, now: DateTime<Utc>) -> Vec<HandlerId> {
    let mut due = Vec::new();
    jobs.retain_mut(|slot| {
        if slot.next_fire > now {
            return true;
        }
        due.push(slot.handler);
        match slot.spec.next_after(now) {
            Some(next) => {
                slot.next_fire = next;
                true
            },
            None => {
                warn!(handler = slot.handler.0, spec = %slot.spec, "trigger exhausted");
                false
            },
        }
    });
    due
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick", &self.tick)
            .field("projects", &self.len())
            .finish()
    }
}
