//! Tasks: discrete, pollable units of robot action
//!
//! A [`Task`] wraps a user-supplied [`Action`] (the four-hook contract:
//! setup, periodic, completion predicate, teardown) together with the state
//! the framework manages for it: completion state, timeout bookkeeping and
//! an optional subsystem claim.
//!
//! Completion is two-fold: a task with a finite timeout is finished once its
//! elapsed time reaches the timeout regardless of its predicate; a task with
//! [`Timeout::Infinite`] finishes only via its predicate or an external
//! [`Task::finish_now`].

pub mod builtin;
pub mod group;

pub use builtin::{condition_task, run_task, wait_task};
pub use group::{GroupPolicy, TaskGroup};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ChildActivationError;
use crate::subsystem::SubsystemId;
use crate::util::SharedClock;

/// Completion state of a task.
///
/// `Finished` is terminal and irreversible without an explicit [`Task::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not yet activated.
    Pending,
    /// Activated and receiving steps.
    Running,
    /// Complete; teardown has run.
    Finished,
}

/// Task timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Never expires; only the predicate or `finish_now` ends the task.
    Infinite,
    /// Expires once elapsed time reaches the duration. A zero duration
    /// expires on the very first poll.
    After(Duration),
}

impl Timeout {
    /// Check expiry against an elapsed duration.
    #[inline]
    pub fn expired(&self, elapsed: Duration) -> bool {
        match self {
            Timeout::Infinite => false,
            Timeout::After(limit) => elapsed >= *limit,
        }
    }
}

/// User hooks for one unit of robot action.
///
/// Every hook has a no-op default so simple actions implement only what they
/// need. `on_start` errors are configuration errors and propagate; `on_tick`
/// errors are logged by the framework and the loop continues.
pub trait Action: Send {
    /// One-time setup, called on the first step of an activation cycle.
    fn on_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Periodic work, called once per tick while running.
    fn on_tick(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Completion predicate, polled once per tick.
    fn is_finished(&mut self) -> bool {
        false
    }

    /// One-time teardown, called exactly once on the transition to finished.
    fn on_finish(&mut self) {}

    /// Clear internal state so the action can run again after a reset.
    fn on_reset(&mut self) {}
}

/// Shared handle to a task. The queue, the claim registry and task groups
/// all refer to the same task through this handle.
pub type TaskRef = Arc<Mutex<Task>>;

/// A discrete, pollable unit of robot action.
pub struct Task {
    name: String,
    state: TaskState,
    timeout: Timeout,
    started_at: Option<Duration>,
    dependency: Option<SubsystemId>,
    override_conflicts: bool,
    clock: SharedClock,
    action: Box<dyn Action>,
}

impl Task {
    /// Create a task from an action.
    pub fn new(
        name: impl Into<String>,
        timeout: Timeout,
        clock: SharedClock,
        action: impl Action + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            state: TaskState::Pending,
            timeout,
            started_at: None,
            dependency: None,
            override_conflicts: false,
            clock,
            action: Box::new(action),
        }
    }

    /// Declare a claim on a subsystem. At most one per task; `overriding`
    /// lets this task pre-empt a conflicting claimant.
    pub fn with_dependency(mut self, subsystem: SubsystemId, overriding: bool) -> Self {
        self.dependency = Some(subsystem);
        self.override_conflicts = overriding;
        self
    }

    /// Wrap into the shared handle used by queues and registries.
    #[inline]
    pub fn into_ref(self) -> TaskRef {
        Arc::new(Mutex::new(self))
    }

    /// Task name for progress display.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current completion state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Check if the task has finished.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == TaskState::Finished
    }

    /// Configured timeout.
    #[inline]
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Declared subsystem claim, if any.
    #[inline]
    pub fn dependency(&self) -> Option<SubsystemId> {
        self.dependency
    }

    /// Whether this task pre-empts conflicting claimants.
    #[inline]
    pub fn overrides_conflicts(&self) -> bool {
        self.override_conflicts
    }

    /// Time spent running this activation cycle. Zero before activation.
    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(start) => self.clock.now().saturating_sub(start),
            None => Duration::ZERO,
        }
    }

    /// Activate the task: record the start time and run the setup hook.
    ///
    /// Idempotent; only the first call per activation cycle has any effect.
    /// A setup failure is a configuration error and propagates to the
    /// caller.
    pub fn activate(&mut self) -> anyhow::Result<()> {
        if self.state != TaskState::Pending {
            return Ok(());
        }
        self.started_at = Some(self.clock.now());
        self.state = TaskState::Running;
        self.action.on_start()
    }

    /// Execute one periodic step. Activates the task first if needed.
    ///
    /// Must not be called after the task has finished; doing so is logged
    /// and ignored. A periodic hook failure is logged and the task keeps
    /// running, with one exception: a [`ChildActivationError`] raised by a
    /// composite propagates, since it is a setup failure in disguise.
    pub fn step(&mut self) -> anyhow::Result<()> {
        match self.state {
            TaskState::Finished => {
                warn!("task '{}' was stepped after finishing, ignoring", self.name);
                Ok(())
            }
            TaskState::Pending => {
                self.activate()?;
                self.tick_logged()
            }
            TaskState::Running => self.tick_logged(),
        }
    }

    fn tick_logged(&mut self) -> anyhow::Result<()> {
        match self.action.on_tick() {
            Ok(()) => Ok(()),
            // A child setup failure inside a composite is a configuration
            // error, not a periodic fault; it must reach the scheduler.
            Err(e) if e.is::<ChildActivationError>() => Err(e),
            Err(e) => {
                warn!("task '{}' periodic hook failed: {e:#}", self.name);
                Ok(())
            }
        }
    }

    /// Poll for completion: timeout expiry or the custom predicate.
    ///
    /// Transitions to finished and runs the teardown hook exactly once on
    /// the first `true` result; idempotent afterwards.
    pub fn poll_finished(&mut self) -> bool {
        if self.state == TaskState::Finished {
            return true;
        }
        if self.timeout.expired(self.elapsed()) || self.action.is_finished() {
            self.transition_finished();
            return true;
        }
        false
    }

    /// Force immediate completion, running teardown if it has not run yet.
    /// Safe to call on an already-finished task.
    pub fn finish_now(&mut self) {
        if self.state != TaskState::Finished {
            debug!("task '{}' force-finished", self.name);
            self.transition_finished();
        }
    }

    /// Return a finished task to pending, clearing its start time. Used when
    /// a task is reused by a group.
    pub fn reset(&mut self) {
        self.state = TaskState::Pending;
        self.started_at = None;
        self.action.on_reset();
    }

    fn transition_finished(&mut self) {
        self.state = TaskState::Finished;
        self.action.on_finish();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .field("dependency", &self.dependency)
            .finish()
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
