//! Framework errors
//!
//! Three error families mirror the failure taxonomy of the framework:
//! configuration errors (programmer mistakes, reported at call time),
//! scheduler queue misuse, and lifecycle failures. Runtime errors thrown
//! by user hooks travel as [`anyhow::Error`] and are logged rather than
//! propagated, except for the stop hook whose failure is always fatal.

use thiserror::Error;

/// Scheduler result
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// OpMode result
pub type OpModeResult<T> = Result<T, OpModeError>;

/// Errors from the task queue scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("cannot insert task at index {index}, out of bounds for queue of {size}")]
    InsertOutOfBounds { index: usize, size: usize },

    #[error("cannot remove task at index {index}, out of bounds for queue of {size}")]
    RemoveOutOfBounds { index: usize, size: usize },

    #[error("task '{name}' failed during activation: {cause}")]
    TaskActivation { name: String, cause: anyhow::Error },
}

/// A group child's setup hook failed.
///
/// Groups surface this through their periodic channel so the task layer can
/// tell it apart from an ordinary periodic fault and re-raise it as the
/// group's own activation failure.
#[derive(Debug, Error)]
#[error("child task '{child}' failed during activation: {cause}")]
pub struct ChildActivationError {
    pub child: String,
    pub cause: anyhow::Error,
}

/// Errors from task and task group construction.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task group created with no tasks")]
    EmptyGroup,
}

/// Errors escaping the OpMode lifecycle.
#[derive(Debug, Error)]
pub enum OpModeError {
    /// The terminating-phase stop hook failed. Cleanup failures indicate
    /// unrecoverable resource state and are never absorbed.
    #[error("stop hook failed: {0}")]
    StopHook(anyhow::Error),

    /// A task activation failure surfaced through the running loop.
    #[error("scheduler fault: {0}")]
    Scheduler(#[from] SchedulerError),
}
