//! Status reporting boundary
//!
//! Telemetry formatting and transport live outside this crate. The scheduler
//! and lifecycle push one status line per tick through [`StatusSink`]; a sink
//! failure is logged and never aborts the tick.

use tracing::info;

/// Receiver for per-tick status lines (task progress, lifecycle phase).
pub trait StatusSink: Send {
    /// Deliver one formatted status line.
    fn status(&mut self, line: &str) -> anyhow::Result<()>;
}

/// Default sink that routes status lines to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn status(&mut self, line: &str) -> anyhow::Result<()> {
        info!("{line}");
        Ok(())
    }
}

/// Sink that drops every line. Useful for tests and headless runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn status(&mut self, _line: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
