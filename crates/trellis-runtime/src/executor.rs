//! The bounded delayed-task executor.
//!
//! One deployment-wide semaphore bounds how many delayed tasks run at
//! once. Submission happens synchronously from inside a sandbox call; it
//! blocks for a slot up to the submit deadline, then fails with a
//! saturation error the script can see. Execution itself goes through the
//! owning instance's serialization lock, so tasks never run concurrently
//! with that instance's other handlers.

use std::sync::{Arc, OnceLock, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, warn};

use trellis_core::script_abi::{HandlerInvocation, InvocationKind, LogLevel};
use trellis_core::{HandlerId, InstanceState, ProjectId};
use trellis_modules::{DelayedSubmitter, InstanceLog, SubmitError};

use crate::engine::SharedEngine;
use crate::logsink::LogBuffer;

/// The deployment-wide pool.
#[derive(Debug)]
pub struct DelayedExecutor {
    semaphore: Arc<Semaphore>,
    submit_timeout: Duration,
}

impl DelayedExecutor {
    /// Create a pool with `pool_size` slots and the given submit deadline.
    #[must_use]
    pub fn new(pool_size: usize, submit_timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            submit_timeout,
        }
    }

    /// Free slots right now.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// A submitter bound to one instance. Armed with its execution target
    /// once the instance's engine exists.
    ///
    /// # Errors
    ///
    /// Fails outside a tokio runtime; the submitter needs a handle to
    /// bridge from sync host functions.
    pub fn submitter(&self, project: ProjectId) -> Result<Arc<InstanceSubmitter>, SubmitError> {
        let handle = Handle::try_current()
            .map_err(|_| SubmitError::Unavailable("no tokio runtime".to_owned()))?;
        Ok(Arc::new(InstanceSubmitter {
            project,
            semaphore: self.semaphore.clone(),
            submit_timeout: self.submit_timeout,
            handle,
            target: OnceLock::new(),
        }))
    }
}

/// Everything needed to actually run a task for one instance.
pub(crate) struct TaskTarget {
    pub(crate) engine: SharedEngine,
    pub(crate) state: watch::Receiver<InstanceState>,
    pub(crate) log: Arc<LogBuffer>,
    pub(crate) timeout: Duration,
}

/// Per-instance delayed-task intake.
pub struct InstanceSubmitter {
    project: ProjectId,
    semaphore: Arc<Semaphore>,
    submit_timeout: Duration,
    handle: Handle,
    target: OnceLock<TaskTarget>,
}

impl InstanceSubmitter {
    /// Arm the submitter with its execution target. Called once, after
    /// the engine exists and before the boot callback runs.
    pub(crate) fn arm(&self, target: TaskTarget) {
        let _ = self.target.set(target);
    }
}

impl DelayedSubmitter for InstanceSubmitter {
    fn submit(&self, handler: HandlerId) -> Result<(), SubmitError> {
        let Some(target) = self.target.get() else {
            return Err(SubmitError::Unavailable(
                "instance is not ready for tasks".to_owned(),
            ));
        };

        let semaphore = self.semaphore.clone();
        let submit_timeout = self.submit_timeout;
        let acquired = self.handle.block_on(async move {
            tokio::time::timeout(submit_timeout, semaphore.acquire_owned()).await
        });
        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(SubmitError::Unavailable("executor closed".to_owned()));
            },
            Err(_) => return Err(SubmitError::Saturated),
        };

        let project = self.project.clone();
        let engine = target.engine.clone();
        let state = target.state.clone();
        let log = target.log.clone();
        let task_timeout = target.timeout;

        self.handle.spawn(async move {
            let _permit = permit;
            if !state.borrow().is_running() {
                debug!(project = %project, handler = handler.0, "dropping task, instance not running");
                return;
            }
            let invocation = HandlerInvocation {
                handler,
                kind: InvocationKind::Task,
                request: None,
            };
            let joined = tokio::time::timeout(
                task_timeout,
                tokio::task::spawn_blocking(move || {
                    let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
                    guard.as_mut().invoke(&invocation)
                }),
            )
            .await;
            match joined {
                Err(_) => {
                    warn!(project = %project, handler = handler.0, "delayed task timed out");
                    log.append(
                        LogLevel::Error,
                        &format!("delayed task {} exceeded its deadline", handler.0),
                    );
                },
                Ok(Err(join_err)) if join_err.is_panic() => {
                    warn!(project = %project, handler = handler.0, "delayed task panicked");
                    log.append(
                        LogLevel::Error,
                        &format!("delayed task {} panicked", handler.0),
                    );
                },
                Ok(Err(_)) => {
                    debug!(project = %project, handler = handler.0, "delayed task cancelled");
                },
                Ok(Ok(Err(e))) => {
                    warn!(project = %project, handler = handler.0, error = %e, "delayed task failed");
                    log.append(
                        LogLevel::Error,
                        &format!("delayed task {} failed: {e}", handler.0),
                    );
                },
                Ok(Ok(Ok(_))) => {},
            }
        });

        Ok(())
    }
}

impl std::fmt::Debug for InstanceSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceSubmitter")
            .field("project", &self.project)
            .field("armed", &self.target.get().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn unarmed_submitter_refuses_tasks() {
        let executor = DelayedExecutor::new(2, Duration::from_millis(50));
        let submitter = executor.submitter(ProjectId::from_static("alpha")).unwrap();

        let submitter_clone = submitter.clone();
        let result =
            tokio::task::spawn_blocking(move || submitter_clone.submit(HandlerId(0))).await;
        assert!(matches!(result.unwrap(), Err(SubmitError::Unavailable(_))));
    }

    #[test]
    fn pool_size_has_a_floor_of_one() {
        let executor = DelayedExecutor::new(0, Duration::from_millis(10));
        assert_eq!(executor.available_permits(), 1);
    }
}
