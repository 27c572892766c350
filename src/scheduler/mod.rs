//! Task queue scheduler for autonomous operation
//!
//! The scheduler advances an ordered queue of pending tasks one head task at
//! a time: each tick it reports progress, polls the head for completion,
//! pops it when finished, steps whichever task is then at the head, and
//! finally dispatches `update()` to every registered subsystem in
//! registration order.
//!
//! Before the lifecycle's ready transition, `add_task_first`/`add_task_last`
//! route into staging buffers; [`TaskScheduler::enter_ready`] runs the
//! task-list callback and then flushes both buffers into the pending queue
//! exactly once, preserving staged call order.
//!
//! The scheduler is a cheap-to-clone handle over shared state, so task step
//! callbacks may hold a clone and add or remove tasks reentrantly; the
//! pending queue's lock is never held across user code.

pub mod queue;

pub use queue::TaskDeque;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::subsystem::{ClaimRegistry, Subsystem, SubsystemId, SubsystemSet};
use crate::task::{run_task, TaskRef};
use crate::telemetry::StatusSink;
use crate::util::SharedClock;

/// What a tick accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A task is still pending or running.
    Running,
    /// The queue is empty: the autonomous program is complete.
    Complete,
}

/// Ordered, mutable task queue with staging, claim tracking and subsystem
/// dispatch. Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct TaskScheduler {
    clock: SharedClock,
    pending: TaskDeque,
    pre_stage: Arc<Mutex<VecDeque<TaskRef>>>,
    post_stage: Arc<Mutex<VecDeque<TaskRef>>>,
    subsystems: Arc<Mutex<SubsystemSet>>,
    registry: Arc<ClaimRegistry>,
    /// Tasks ever enqueued; display only, never an index.
    task_count: Arc<AtomicUsize>,
    /// 1-based position of the current task for progress display.
    current_index: Arc<AtomicUsize>,
    ready: Arc<AtomicBool>,
}

impl TaskScheduler {
    /// Create a scheduler driven by the given clock.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            pending: TaskDeque::new(),
            pre_stage: Arc::new(Mutex::new(VecDeque::new())),
            post_stage: Arc::new(Mutex::new(VecDeque::new())),
            subsystems: Arc::new(Mutex::new(SubsystemSet::new())),
            registry: Arc::new(ClaimRegistry::new()),
            task_count: Arc::new(AtomicUsize::new(0)),
            current_index: Arc::new(AtomicUsize::new(1)),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The scheduler's clock, for constructing tasks.
    #[inline]
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// The claim registry shared with task groups.
    #[inline]
    pub fn registry(&self) -> Arc<ClaimRegistry> {
        self.registry.clone()
    }

    /// Register a subsystem for per-tick updates. Registration order is
    /// dispatch order.
    pub fn register_subsystem(&self, subsystem: Box<dyn Subsystem>) -> SubsystemId {
        let id = self.subsystems.lock().register(subsystem);
        self.registry.mark_registered(id);
        id
    }

    /// Whether the ready transition has happened.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Number of pending tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if the pending queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total tasks ever enqueued, for progress display.
    #[inline]
    pub fn task_count(&self) -> usize {
        self.task_count.load(Ordering::SeqCst)
    }

    /// Append a task to the pending queue.
    pub fn add_task(&self, task: TaskRef) {
        self.add_task_ack(task, false);
    }

    /// Append a task, optionally suppressing the caution emitted when a task
    /// is added manually before the ready callback.
    pub fn add_task_ack(&self, task: TaskRef, ack: bool) {
        self.registry.warn_if_unmanaged(&task);
        if !self.is_ready() && !ack {
            debug!("auto: caution! a task was added manually before the ready callback");
        }
        self.pending.push_back(task.clone());
        let total = self.task_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("auto: '{}' added as task {total}/{total}", task.lock().name());
    }

    /// Append a one-shot callback task, returning its handle.
    pub fn add_task_fn(&self, callback: impl FnOnce() + Send + 'static) -> TaskRef {
        let task = run_task(self.clock(), callback).into_ref();
        self.add_task(task.clone());
        task
    }

    /// Add a task to the very start of the queue. Before the ready
    /// transition this stages the task instead, preserving call order.
    pub fn add_task_first(&self, task: TaskRef) {
        self.registry.warn_if_unmanaged(&task);
        if !self.is_ready() {
            let mut stage = self.pre_stage.lock();
            stage.push_back(task.clone());
            debug!(
                "auto: '{}' queued as pre-init task 1/{}",
                task.lock().name(),
                stage.len()
            );
            return;
        }
        self.admit_front(task);
    }

    fn admit_front(&self, task: TaskRef) {
        self.pending.push_front(task.clone());
        let total = self.task_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("auto: '{}' added as task 1/{total}", task.lock().name());
    }

    /// Add a task to the very end of the queue. Before the ready transition
    /// this stages the task instead, preserving call order.
    pub fn add_task_last(&self, task: TaskRef) {
        self.registry.warn_if_unmanaged(&task);
        if !self.is_ready() {
            let mut stage = self.post_stage.lock();
            stage.push_back(task.clone());
            debug!(
                "auto: '{}' queued as end-init task {n}/{n}",
                task.lock().name(),
                n = stage.len()
            );
            return;
        }
        self.pending.push_back(task.clone());
        let total = self.task_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("auto: '{}' added as task {total}/{total}", task.lock().name());
    }

    /// Insert a task so it becomes the `index`-th pending element (0-based).
    /// Out-of-bounds indices are reported, not absorbed.
    pub fn add_task_at(&self, index: usize, task: TaskRef) -> SchedulerResult<()> {
        self.registry.warn_if_unmanaged(&task);
        let name = task.lock().name().to_owned();
        if !self.pending.insert(index, task) {
            return Err(SchedulerError::InsertOutOfBounds {
                index,
                size: self.pending.len(),
            });
        }
        let total = self.task_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("auto: '{name}' inserted as task {index}/{total}");
        Ok(())
    }

    /// Remove the task at `index`. Out-of-bounds indices are reported and
    /// the queue is left untouched.
    pub fn remove_task_at(&self, index: usize) -> SchedulerResult<()> {
        match self.pending.remove_at(index) {
            Some(_) => {
                self.task_count.fetch_sub(1, Ordering::SeqCst);
                debug!("auto: task at index {index} was removed");
                Ok(())
            }
            None => Err(SchedulerError::RemoveOutOfBounds {
                index,
                size: self.pending.len(),
            }),
        }
    }

    /// Remove a task by handle identity. Removing a task that is not queued
    /// is a logged no-op.
    pub fn remove_task(&self, task: &TaskRef) {
        if self.pending.remove_ref(task) {
            self.task_count.fetch_sub(1, Ordering::SeqCst);
            debug!("auto: task '{}' was removed", task.lock().name());
        } else {
            debug!("auto: task '{}' was not found in the queue", task.lock().name());
        }
    }

    /// Remove the head of the queue. Empty queue is a logged no-op.
    pub fn remove_task_first(&self) {
        match self.pending.pop_front() {
            Some(_) => {
                self.task_count.fetch_sub(1, Ordering::SeqCst);
                debug!("auto: task at index 0 was removed");
            }
            None => warn!("auto: remove_task_first called on an empty queue"),
        }
    }

    /// Remove the tail of the queue. Empty queue is a logged no-op.
    pub fn remove_task_last(&self) {
        match self.pending.pop_back() {
            Some(_) => {
                let total = self.task_count.fetch_sub(1, Ordering::SeqCst);
                debug!("auto: task at index {} was removed", total.saturating_sub(1));
            }
            None => warn!("auto: remove_task_last called on an empty queue"),
        }
    }

    /// Perform the ready transition exactly once: run the task-list callback
    /// first, then append the post-staged tasks and prepend the pre-staged
    /// tasks, both in their original call order, then discard the buffers.
    pub fn enter_ready(&self, on_ready: impl FnOnce(&TaskScheduler) -> anyhow::Result<()>) {
        if self.ready.swap(true, Ordering::SeqCst) {
            warn!("auto: ready transition requested twice, ignoring");
            return;
        }

        if let Err(e) = on_ready(self) {
            warn!("auto: ready callback failed: {e:#}");
        }

        let staged: Vec<TaskRef> = self.post_stage.lock().drain(..).collect();
        for task in staged {
            self.add_task_ack(task, true);
        }
        // Prepend in reverse so the earliest-staged task ends up first.
        let staged: Vec<TaskRef> = self.pre_stage.lock().drain(..).collect();
        for task in staged.into_iter().rev() {
            self.admit_front(task);
        }
    }

    /// Run one scheduler tick. A tick before the ready transition is a
    /// warned no-op reporting [`TickOutcome::Running`].
    ///
    /// An empty queue reports [`TickOutcome::Complete`]; the lifecycle
    /// treats that as terminal. A task activation failure is a
    /// configuration error and propagates.
    pub fn tick(&self, sink: &mut dyn StatusSink) -> SchedulerResult<TickOutcome> {
        if !self.is_ready() {
            // Staged tasks have not been flushed; an empty pending queue
            // here must not read as program completion.
            warn!("auto: tick called before the ready transition, ignoring");
            return Ok(TickOutcome::Running);
        }
        let Some(head) = self.pending.peek_front() else {
            debug!("auto: all tasks done, finishing");
            return Ok(TickOutcome::Complete);
        };

        let index = self.current_index.load(Ordering::SeqCst);
        let total = self.task_count.load(Ordering::SeqCst);
        let name = head.lock().name().to_owned();
        if let Err(e) = sink.status(&format!("Running task ({index}/{total}): {name}")) {
            warn!("auto: status sink failed: {e:#}");
        }

        if head.lock().poll_finished() {
            // Reentrant removal may have already dequeued it.
            if let Some(front) = self.pending.peek_front() {
                if TaskRef::ptr_eq(&front, &head) {
                    self.pending.pop_front();
                }
            }
            debug!("auto: task {index}/{total} ({name}) finished");
            self.current_index.fetch_add(1, Ordering::SeqCst);
        }

        // Whichever task is now at the head gets its step this tick, so a
        // freshly-popped successor starts in the same cycle.
        if let Some(current) = self.pending.peek_front() {
            self.step_task(&current)?;
        }

        self.dispatch_subsystems()?;
        Ok(TickOutcome::Running)
    }

    /// Dispatch `update()` to every registered subsystem in registration
    /// order, driving any task claiming that subsystem first.
    fn dispatch_subsystems(&self) -> SchedulerResult<()> {
        let ids: Vec<SubsystemId> = self.subsystems.lock().ids().collect();
        for id in ids {
            if let Some(claimed) = self.registry.claimant(id) {
                if claimed.lock().poll_finished() {
                    self.registry.release(id);
                } else {
                    self.step_task(&claimed)?;
                }
            }
            self.subsystems.lock().update(id);
        }
        Ok(())
    }

    fn step_task(&self, task: &TaskRef) -> SchedulerResult<()> {
        let mut guard = task.lock();
        if let Err(cause) = guard.step() {
            let name = guard.name().to_owned();
            return Err(SchedulerError::TaskActivation { name, cause });
        }
        Ok(())
    }

    /// Names of the pending tasks in queue order. Diagnostic helper.
    pub fn pending_names(&self) -> Vec<String> {
        self.pending
            .snapshot()
            .iter()
            .map(|t| t.lock().name().to_owned())
            .collect()
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("pending", &self.pending.len())
            .field("task_count", &self.task_count())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests;
