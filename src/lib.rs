//! roboloop
//!
//! Deterministic control-flow core for robot match programs: an OpMode
//! lifecycle state machine, an ordered task queue scheduler, composable
//! task groups, and a subsystem claim registry that serializes conflicting
//! hardware access.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use roboloop::opmode::{OpMode, OpModeContext, OpModeRunner};
//! use roboloop::task::builtin::wait_task;
//! use roboloop::util::SystemClock;
//!
//! struct Auto;
//!
//! impl OpMode for Auto {
//!     fn on_init(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn on_ready(
//!         &mut self,
//!         ctx: &mut OpModeContext,
//!         _selection: &roboloop::opmode::Selection,
//!     ) -> anyhow::Result<()> {
//!         ctx.scheduler()
//!             .add_task(wait_task(ctx.clock(), Duration::from_secs(2)).into_ref());
//!         Ok(())
//!     }
//! }
//!
//! let runner = OpModeRunner::new(Auto, SystemClock::shared());
//! assert_eq!(runner.phase(), roboloop::opmode::OpModePhase::Idle);
//! ```

#![doc(html_root_url = "https://docs.rs/roboloop")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod error;
pub mod opmode;
pub mod scheduler;
pub mod subsystem;
pub mod task;
pub mod telemetry;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use error::{ChildActivationError, OpModeError, SchedulerError, TaskError};
pub use opmode::{Host, OpMode, OpModeContext, OpModePhase, OpModeRunner, Selection};
pub use scheduler::{TaskScheduler, TickOutcome};
pub use subsystem::{Subsystem, SubsystemId};
pub use task::{Task, TaskRef, TaskState, Timeout};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
