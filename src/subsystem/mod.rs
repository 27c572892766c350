//! Subsystems and the dependency claim registry
//!
//! A subsystem is a periodically-updated hardware-facing component. Tasks may
//! declare a claim on one subsystem; the [`ClaimRegistry`] tracks which task
//! currently commands each subsystem so two concurrently active tasks never
//! issue conflicting hardware commands.
//!
//! Subsystems are owned by the scheduler in a [`SubsystemSet`] table and
//! referred to everywhere else by [`SubsystemId`], a non-owning handle.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::task::TaskRef;

/// A periodically-updated hardware-facing component.
///
/// `update()` is called once per tick after the current task's step, in
/// registration order. Subsystems with no pending work must treat it as a
/// cheap no-op.
pub trait Subsystem: Send {
    /// Subsystem name for diagnostics.
    fn name(&self) -> &str;

    /// Advance the subsystem by one tick.
    fn update(&mut self);
}

/// Handle into the scheduler-owned subsystem table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubsystemId(pub usize);

impl std::fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subsystem({})", self.0)
    }
}

/// Ordered table of registered subsystems, owned by the scheduler.
#[derive(Default)]
pub struct SubsystemSet {
    entries: Vec<Box<dyn Subsystem>>,
}

impl SubsystemSet {
    /// Create an empty set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem, returning its handle. Registration order is
    /// dispatch order.
    pub fn register(&mut self, subsystem: Box<dyn Subsystem>) -> SubsystemId {
        let id = SubsystemId(self.entries.len());
        debug!("subsystem '{}' registered as {id}", subsystem.name());
        self.entries.push(subsystem);
        id
    }

    /// Name of a registered subsystem.
    pub fn name(&self, id: SubsystemId) -> Option<&str> {
        self.entries.get(id.0).map(|s| s.name())
    }

    /// Number of registered subsystems.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles of all registered subsystems, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = SubsystemId> {
        (0..self.entries.len()).map(SubsystemId)
    }

    /// Dispatch `update()` to one subsystem.
    pub fn update(&mut self, id: SubsystemId) {
        if let Some(subsystem) = self.entries.get_mut(id.0) {
            subsystem.update();
        }
    }
}

impl std::fmt::Debug for SubsystemSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Outcome of attempting to claim a subsystem for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The subsystem was free (or already held by the same task).
    Granted,
    /// Another task held the claim and was pre-empted.
    Preempted,
    /// Another task holds the claim and the new task does not override.
    Rejected,
}

struct Claim {
    task: TaskRef,
    name: String,
}

/// Tracks which task currently claims each subsystem.
///
/// Shared between the scheduler and task groups; interior locking keeps every
/// claim/release serialized.
#[derive(Default)]
pub struct ClaimRegistry {
    claims: Mutex<HashMap<SubsystemId, Claim>>,
    registered: Mutex<Vec<SubsystemId>>,
}

impl ClaimRegistry {
    /// Create an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a subsystem is registered for periodic updates.
    pub fn mark_registered(&self, id: SubsystemId) {
        let mut registered = self.registered.lock();
        if !registered.contains(&id) {
            registered.push(id);
        }
    }

    /// Claim `id` for `task`. A conflicting claim is pre-empted only if the
    /// task declares conflict override; otherwise the claim is rejected and
    /// a diagnostic is emitted.
    pub fn claim(&self, id: SubsystemId, task: &TaskRef, overriding: bool) -> ClaimOutcome {
        let name = task.lock().name().to_owned();
        let mut claims = self.claims.lock();
        match claims.get(&id) {
            Some(held) if TaskRef::ptr_eq(&held.task, task) => ClaimOutcome::Granted,
            Some(held) => {
                if overriding {
                    warn!(
                        "task '{name}' pre-empted '{holder}' on {id}",
                        holder = held.name
                    );
                    claims.insert(
                        id,
                        Claim {
                            task: task.clone(),
                            name,
                        },
                    );
                    ClaimOutcome::Preempted
                } else {
                    warn!(
                        "task '{name}' wants {id} but '{holder}' holds it, deferring",
                        holder = held.name
                    );
                    ClaimOutcome::Rejected
                }
            }
            None => {
                debug!("task '{name}' claimed {id}");
                claims.insert(
                    id,
                    Claim {
                        task: task.clone(),
                        name,
                    },
                );
                ClaimOutcome::Granted
            }
        }
    }

    /// Current claimant of a subsystem, if any.
    pub fn claimant(&self, id: SubsystemId) -> Option<TaskRef> {
        self.claims.lock().get(&id).map(|c| c.task.clone())
    }

    /// Release the claim on a subsystem.
    pub fn release(&self, id: SubsystemId) {
        if let Some(claim) = self.claims.lock().remove(&id) {
            debug!("task '{}' released {id}", claim.name);
        }
    }

    /// Release every claim held by `task`.
    pub fn release_task(&self, task: &TaskRef) {
        self.claims
            .lock()
            .retain(|_, claim| !TaskRef::ptr_eq(&claim.task, task));
    }

    /// Drop all claims. Used at lifecycle teardown.
    pub fn release_all(&self) {
        self.claims.lock().clear();
    }

    /// Safety net for a forgotten `register_subsystem` call: a task whose
    /// dependency is not receiving periodic updates gets a warning, never an
    /// error.
    pub fn warn_if_unmanaged(&self, task: &TaskRef) {
        let task = task.lock();
        if let Some(dependency) = task.dependency() {
            if !self.registered.lock().contains(&dependency) {
                warn!(
                    "task '{}' depends on {dependency}, but it is not being updated; \
                     ensure it is registered with the scheduler",
                    task.name()
                );
            }
        }
    }
}

impl std::fmt::Debug for ClaimRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimRegistry")
            .field("claims", &self.claims.lock().len())
            .field("registered", &self.registered.lock().len())
            .finish()
    }
}
