//! Utility types and functions

pub mod clock;
pub mod logger;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
