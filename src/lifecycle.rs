//! Lifecycle and task watchdog
//!
//! [`Lifecycle`] is the single authority over whether the pipeline runs. Every
//! background component receives a [`LifecycleHandle`] at construction and
//! observes state changes through it. [`TaskWatchdog`] keeps track of spawned
//! background tasks so shutdown can wait for them and leaks can be reported.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use derive_more::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Number of live tasks above which `monitor` complains
const TASK_WARNING_THRESHOLD: usize = 20;
/// Shutdown polls after which waiting is reported as a warning
const SHUTDOWN_WARNING_ATTEMPTS: u32 = 20;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: PluginState, to: PluginState },

    #[error("Tasks still running after shutdown: {0}")]
    ShutdownTimedOut(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Overall pipeline state
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PluginState {
    #[default]
    #[display("Disabled")]
    Disabled,
    #[display("Starting")]
    Starting,
    #[display("Enabled")]
    Enabled,
    #[display("Stopping")]
    Stopping,
}

impl PluginState {
    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disabled, Self::Starting)
                | (Self::Starting, Self::Enabled | Self::Disabled)
                | (Self::Enabled, Self::Stopping)
                | (Self::Stopping, Self::Disabled)
        )
    }
}

/// Owner of the pipeline state
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<PluginState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PluginState::Disabled);
        Self { tx }
    }

    #[must_use]
    pub fn state(&self) -> PluginState {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn handle(&self) -> LifecycleHandle {
        LifecycleHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidTransition` if `next` is not reachable
    /// from the current state.
    pub fn transition(&self, next: PluginState) -> LifecycleResult<()> {
        let mut result = Ok(());
        self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                debug!("Lifecycle {state} -> {next}");
                *state = next;
                true
            } else {
                result = Err(LifecycleError::InvalidTransition {
                    from: *state,
                    to: next,
                });
                false
            }
        });
        result
    }
}

/// Read side of the lifecycle, cloned into every background component
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    rx: watch::Receiver<PluginState>,
}

impl LifecycleHandle {
    #[must_use]
    pub fn state(&self) -> PluginState {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state() == PluginState::Enabled
    }

    /// Resolves once the pipeline is no longer enabled
    pub async fn stopped(&mut self) {
        // A dropped sender means the owner is gone, which counts as stopped
        let _ = self
            .rx
            .wait_for(|state| *state != PluginState::Enabled)
            .await;
    }
}

#[derive(Debug, Clone)]
struct TrackedTask {
    name: String,
    started_at: DateTime<Utc>,
}

/// Removes a task's registration when its future finishes, panics or is dropped
struct WatchdogGuard {
    tasks: Arc<DashMap<u64, TrackedTask>>,
    id: u64,
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.tasks.remove(&self.id);
    }
}

/// Registry of live background tasks
#[derive(Debug, Clone, Default)]
pub struct TaskWatchdog {
    tasks: Arc<DashMap<u64, TrackedTask>>,
    next_id: Arc<AtomicU64>,
}

impl TaskWatchdog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a named task that deregisters itself however it ends
    pub fn spawn<F>(&self, name: impl Into<String>, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(
            id,
            TrackedTask {
                name: name.into(),
                started_at: Utc::now(),
            },
        );
        let guard = WatchdogGuard {
            tasks: Arc::clone(&self.tasks),
            id,
        };
        tokio::spawn(async move {
            let _guard = guard;
            future.await;
        })
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_alive(&self, name: &str) -> bool {
        self.tasks.iter().any(|task| task.name == name)
    }

    /// `name[id]` for every live task, oldest first
    #[must_use]
    pub fn alive_names(&self) -> Vec<String> {
        let mut tasks: Vec<(u64, TrackedTask)> = self
            .tasks
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        tasks.sort_by_key(|(id, task)| (task.started_at, *id));
        tasks
            .into_iter()
            .map(|(id, task)| format!("{}[{id}]", task.name))
            .collect()
    }

    /// Warn when an unusual number of tasks is alive
    pub fn monitor(&self) -> bool {
        if self.count() < TASK_WARNING_THRESHOLD {
            return false;
        }
        warn!("Task warning: {}", self.alive_names().join(" "));
        true
    }

    /// Poll until every task registered under `name` has exited
    ///
    /// Other tasks are left to finish on their own.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::ShutdownTimedOut` with the remaining task names
    /// once `max_attempts` polls have passed.
    pub async fn monitor_shutdown(
        &self,
        name: &str,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> LifecycleResult<()> {
        let mut attempts = 0;
        loop {
            if !self.is_alive(name) {
                return Ok(());
            }
            attempts += 1;
            let alive = self.alive_names().join(" ");
            if attempts > max_attempts {
                error!("Giving up waiting for {name} to exit: {alive}");
                return Err(LifecycleError::ShutdownTimedOut(alive));
            }
            if attempts > SHUTDOWN_WARNING_ATTEMPTS {
                warn!("Waiting for {name} to exit: {alive}");
            } else {
                debug!("Waiting for {name} to exit: {alive}");
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
