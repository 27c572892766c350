//! Builtin task constructors
//!
//! Small conveniences for the common cases: run a callback once, wait out a
//! duration, or poll a predicate.

use std::time::Duration;

use super::{Action, Task, Timeout};
use crate::util::SharedClock;

/// Action that runs a callback exactly once, then reports finished.
struct RunOnce {
    callback: Option<Box<dyn FnOnce() + Send>>,
}

impl Action for RunOnce {
    fn on_tick(&mut self) -> anyhow::Result<()> {
        if let Some(callback) = self.callback.take() {
            callback();
        }
        Ok(())
    }

    fn is_finished(&mut self) -> bool {
        self.callback.is_none()
    }
}

/// A task that runs `callback` once on its first step and then completes.
///
/// ```
/// # use roboloop::task::run_task;
/// # use roboloop::util::SystemClock;
/// let task = run_task(SystemClock::shared(), || println!("claws up"));
/// ```
pub fn run_task(clock: SharedClock, callback: impl FnOnce() + Send + 'static) -> Task {
    Task::new(
        "Run",
        Timeout::Infinite,
        clock,
        RunOnce {
            callback: Some(Box::new(callback)),
        },
    )
}

/// Action with no behaviour; completion comes from the task timeout.
struct Idle;

impl Action for Idle {}

/// A task that does nothing until its timeout expires.
pub fn wait_task(clock: SharedClock, duration: Duration) -> Task {
    Task::new("Wait", Timeout::After(duration), clock, Idle)
}

/// Action finished once the wrapped predicate returns true.
struct Until {
    predicate: Box<dyn FnMut() -> bool + Send>,
}

impl Action for Until {
    fn is_finished(&mut self) -> bool {
        (self.predicate)()
    }
}

/// A task that runs until `predicate` returns true, bounded by `timeout`.
pub fn condition_task(
    clock: SharedClock,
    timeout: Timeout,
    predicate: impl FnMut() -> bool + Send + 'static,
) -> Task {
    Task::new(
        "Condition",
        timeout,
        clock,
        Until {
            predicate: Box::new(predicate),
        },
    )
}
