//! Composite tasks
//!
//! A [`TaskGroup`] owns a fixed, non-empty set of child tasks and arbitrates
//! their execution under a [`GroupPolicy`]. The group itself is an [`Action`]
//! wrapped in an ordinary [`Task`] with an infinite timeout; its own setup
//! and teardown hooks are no-ops, delegating entirely to the children.
//!
//! Children that declare a subsystem dependency are not stepped by the group:
//! they are claimed in the [`ClaimRegistry`] once per activation (the
//! "attached" set) and driven by the scheduler's subsystem dispatch. A claim
//! conflict between group members defers the late claimant until the holder
//! releases, serializing conflicting commands.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ChildActivationError, TaskError};
use crate::subsystem::{ClaimOutcome, ClaimRegistry};
use crate::task::{Action, Task, TaskRef, Timeout};
use crate::util::SharedClock;

/// How a group advances its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPolicy {
    /// Children run one at a time, in order; the group finishes with the
    /// last child.
    Sequential,
    /// All children run concurrently; the group finishes when every child
    /// has finished.
    Parallel,
    /// All children run concurrently; the group finishes when any child
    /// finishes, force-finishing the rest.
    Race,
}

/// A composite task coordinating child tasks under a concurrency policy.
pub struct TaskGroup {
    policy: GroupPolicy,
    children: Vec<TaskRef>,
    attached: HashSet<usize>,
    cursor: usize,
    registry: Arc<ClaimRegistry>,
}

impl TaskGroup {
    /// Create a group over a non-empty list of children.
    pub fn new(
        policy: GroupPolicy,
        children: Vec<TaskRef>,
        registry: Arc<ClaimRegistry>,
    ) -> Result<Self, TaskError> {
        if children.is_empty() {
            return Err(TaskError::EmptyGroup);
        }
        Ok(Self {
            policy,
            children,
            attached: HashSet::new(),
            cursor: 0,
            registry,
        })
    }

    /// Wrap the group into a schedulable [`Task`]. Completion comes from the
    /// policy, never from a timeout.
    pub fn into_task(self, name: impl Into<String>, clock: SharedClock) -> Task {
        Task::new(name, Timeout::Infinite, clock, self)
    }

    /// Execute one child for this tick.
    ///
    /// Attached children are a no-op here: their subsystem drives them. A
    /// child with an unclaimed dependency is claimed and marked attached; a
    /// dependency-less child is stepped directly.
    fn execute_child(&mut self, index: usize) -> anyhow::Result<()> {
        if self.attached.contains(&index) {
            return Ok(());
        }
        let child = &self.children[index];
        let (dependency, overriding) = {
            let child = child.lock();
            (child.dependency(), child.overrides_conflicts())
        };
        match dependency {
            Some(id) => match self.registry.claim(id, child, overriding) {
                ClaimOutcome::Granted | ClaimOutcome::Preempted => {
                    self.attached.insert(index);
                }
                // Holder keeps the subsystem; retry next tick.
                ClaimOutcome::Rejected => {}
            },
            None => {
                let mut child = child.lock();
                if let Err(cause) = child.step() {
                    let failed = child.name().to_owned();
                    // Do not keep ticking a half-activated child.
                    child.finish_now();
                    return Err(ChildActivationError {
                        child: failed,
                        cause,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Force-terminate every child. Safe on already-finished children.
    fn finish_all(&mut self) {
        for child in &self.children {
            child.lock().finish_now();
            self.registry.release_task(child);
        }
    }
}

impl Action for TaskGroup {
    fn on_tick(&mut self) -> anyhow::Result<()> {
        match self.policy {
            GroupPolicy::Sequential => {
                while self.cursor < self.children.len()
                    && self.children[self.cursor].lock().poll_finished()
                {
                    self.registry.release_task(&self.children[self.cursor]);
                    self.attached.remove(&self.cursor);
                    self.cursor += 1;
                }
                if self.cursor < self.children.len() {
                    self.execute_child(self.cursor)?;
                }
            }
            GroupPolicy::Parallel | GroupPolicy::Race => {
                for index in 0..self.children.len() {
                    if !self.children[index].lock().poll_finished() {
                        self.execute_child(index)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn is_finished(&mut self) -> bool {
        match self.policy {
            GroupPolicy::Sequential => self.cursor >= self.children.len(),
            GroupPolicy::Parallel => self.children.iter().all(|c| c.lock().is_finished()),
            GroupPolicy::Race => {
                if self.children.iter().any(|c| c.lock().is_finished()) {
                    self.finish_all();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Finishing the group, normally or by force, cancels every child and
    /// drops their claims.
    fn on_finish(&mut self) {
        self.finish_all();
    }

    fn on_reset(&mut self) {
        for child in &self.children {
            self.registry.release_task(child);
            child.lock().reset();
        }
        self.attached.clear();
        self.cursor = 0;
    }
}
