//! Shared test doubles for lifecycle runs.

use std::sync::Arc;

use parking_lot::Mutex;
use roboloop::opmode::Host;
use roboloop::telemetry::StatusSink;

/// A hardware loop stand-in driven by idle-call counts: start is requested
/// from the `start_at`-th idle onwards, stop from the `stop_at`-th. An
/// optional callback runs on every idle so tests can interleave control
/// actions with the loop.
pub struct ScriptedHost {
    idles: u64,
    start_at: u64,
    stop_at: u64,
    on_idle: Option<Box<dyn FnMut(u64)>>,
}

impl ScriptedHost {
    pub fn new(start_at: u64, stop_at: u64) -> Self {
        Self {
            idles: 0,
            start_at,
            stop_at,
            on_idle: None,
        }
    }

    pub fn with_on_idle(mut self, on_idle: impl FnMut(u64) + 'static) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }
}

impl Host for ScriptedHost {
    fn start_requested(&mut self) -> bool {
        self.idles >= self.start_at
    }

    fn stop_requested(&mut self) -> bool {
        self.idles >= self.stop_at
    }

    fn idle(&mut self) {
        self.idles += 1;
        assert!(self.idles < 10_000, "runaway lifecycle loop");
        if let Some(on_idle) = self.on_idle.as_mut() {
            on_idle(self.idles);
        }
    }
}

/// Status sink that records every line for later assertions.
pub struct VecSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl VecSink {
    pub fn shared() -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                lines: lines.clone(),
            },
            lines,
        )
    }
}

impl StatusSink for VecSink {
    fn status(&mut self, line: &str) -> anyhow::Result<()> {
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}
