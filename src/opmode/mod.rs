//! OpMode lifecycle state machine
//!
//! One OpMode run drives a strict, monotonic phase chain:
//!
//! ```text
//! idle -> setup -> static_init -> dynamic_init -> finish_init
//!      -> ready -> starting -> running -> finished -> terminating
//! ```
//!
//! Phases are never skipped or re-entered. The halted condition freezes the
//! running loop body without being a phase of its own: halting and resuming
//! toggle a flag checked each tick, so the phase chain stays monotonic.
//!
//! User hooks are failure-isolated: an error from an init, init-loop,
//! init-done, ready, start or periodic hook is logged and the lifecycle
//! proceeds, so operator feedback stays visible even when robot code
//! misbehaves. The one exception is the stop hook, whose failure indicates
//! unrecoverable resource state and propagates out of [`OpModeRunner::run`].

pub mod selection;

pub use selection::{Selection, SelectionPoller, UserSelection};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{OpModeError, OpModeResult};
use crate::scheduler::{TaskScheduler, TickOutcome};
use crate::telemetry::{LogSink, StatusSink};
use crate::util::SharedClock;

/// Lifecycle phase of one OpMode run. Strictly ordered; transitions only
/// move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpModePhase {
    Idle,
    Setup,
    StaticInit,
    DynamicInit,
    FinishInit,
    Ready,
    Starting,
    Running,
    Finished,
    Terminating,
}

impl std::fmt::Display for OpModePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpModePhase::Idle => "idle",
            OpModePhase::Setup => "setup",
            OpModePhase::StaticInit => "static_init",
            OpModePhase::DynamicInit => "dynamic_init",
            OpModePhase::FinishInit => "finish_init",
            OpModePhase::Ready => "ready",
            OpModePhase::Starting => "starting",
            OpModePhase::Running => "running",
            OpModePhase::Finished => "finished",
            OpModePhase::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

/// The hosting hardware loop: operator signals and the per-tick yield
/// point. The framework has no entry point of its own.
pub trait Host {
    /// True once the operator has pressed start. Must stay true afterwards.
    fn start_requested(&mut self) -> bool;

    /// True once the operator has requested a stop. Must stay true
    /// afterwards.
    fn stop_requested(&mut self) -> bool;

    /// Yield for the remainder of the hardware tick.
    fn idle(&mut self);
}

/// User hooks for one OpMode. Every hook except `on_init` has a default.
///
/// Hook errors are logged and absorbed by the lifecycle, with the sole
/// exception of [`OpMode::on_stop`].
pub trait OpMode {
    /// One-time hardware initialisation. Declare configuration options for
    /// operator selection with [`OpModeContext::set_options`].
    fn on_init(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()>;

    /// Looping init hook; return `Ok(true)` once init work is done.
    fn on_init_loop(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// One-time hook after the init loop completes.
    fn on_init_done(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Build the initial task list. Runs at the ready transition, before
    /// the staged tasks are flushed around it.
    fn on_ready(&mut self, _ctx: &mut OpModeContext, _selection: &Selection) -> anyhow::Result<()> {
        Ok(())
    }

    /// One-time hook when play is pressed.
    fn on_start(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Per-tick hook, runs before the task queue is processed.
    fn periodic(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Teardown. Errors here are fatal and propagate.
    fn on_stop(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Clonable handle for halting, resuming and finishing the running loop
/// from outside the lifecycle (or from user hooks via the context).
#[derive(Debug, Clone, Default)]
pub struct OpModeControls {
    halted: Arc<AtomicBool>,
    finish: Arc<AtomicBool>,
}

impl OpModeControls {
    /// Freeze the running loop body. Idempotent.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    /// Resume a halted loop. Never re-enters the starting phase.
    pub fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
    }

    /// Stop task processing; subsequent ticks idle. Idempotent.
    pub fn finish(&self) {
        self.finish.store(true, Ordering::SeqCst);
    }

    /// Whether the loop is currently halted.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Whether a finish has been requested.
    pub fn finish_requested(&self) -> bool {
        self.finish.load(Ordering::SeqCst)
    }
}

/// Per-run state handed to every user hook.
pub struct OpModeContext {
    scheduler: TaskScheduler,
    clock: SharedClock,
    controls: OpModeControls,
    phase: OpModePhase,
    options: Vec<String>,
    started_at: Option<Duration>,
    halted_at: Option<Duration>,
    halted_total: Duration,
    ticks: u64,
}

impl OpModeContext {
    fn new(scheduler: TaskScheduler, clock: SharedClock) -> Self {
        Self {
            scheduler,
            clock,
            controls: OpModeControls::default(),
            phase: OpModePhase::Idle,
            options: Vec::new(),
            started_at: None,
            halted_at: None,
            halted_total: Duration::ZERO,
            ticks: 0,
        }
    }

    /// Handle to the task queue scheduler.
    #[inline]
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// The run's clock.
    #[inline]
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Current lifecycle phase.
    #[inline]
    pub fn phase(&self) -> OpModePhase {
        self.phase
    }

    /// Loop controls, also available to code outside the hooks.
    #[inline]
    pub fn controls(&self) -> OpModeControls {
        self.controls.clone()
    }

    /// Declare configuration options for operator selection. Only
    /// meaningful from `on_init`.
    pub fn set_options(&mut self, options: Vec<String>) {
        self.options = options;
    }

    /// Freeze the running loop body.
    pub fn halt(&self) {
        self.controls.halt();
    }

    /// Resume a halted loop.
    pub fn resume(&self) {
        self.controls.resume();
    }

    /// Stop task processing; the lifecycle moves to finished.
    pub fn finish(&self) {
        self.controls.finish();
    }

    /// Time since the starting phase, excluding halted spans. Zero before
    /// start; frozen while halted.
    pub fn runtime(&self) -> Duration {
        let Some(start) = self.started_at else {
            return Duration::ZERO;
        };
        let now = self.halted_at.unwrap_or_else(|| self.clock.now());
        now.saturating_sub(start).saturating_sub(self.halted_total)
    }

    /// Completed running-loop ticks.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Drives one OpMode through the full lifecycle.
pub struct OpModeRunner {
    opmode: Box<dyn OpMode>,
    ctx: OpModeContext,
    sink: Box<dyn StatusSink>,
    selection_poller: Option<SelectionPoller>,
    selection_worker: Option<UserSelection>,
    selection: Selection,
}

impl OpModeRunner {
    /// Create a runner over an OpMode, with the default log-backed status
    /// sink.
    pub fn new(opmode: impl OpMode + 'static, clock: SharedClock) -> Self {
        let scheduler = TaskScheduler::new(clock.clone());
        Self {
            opmode: Box::new(opmode),
            ctx: OpModeContext::new(scheduler, clock),
            sink: Box::new(LogSink),
            selection_poller: None,
            selection_worker: None,
            selection: Selection::Empty,
        }
    }

    /// Replace the status sink.
    pub fn with_sink(mut self, sink: Box<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Provide the operator input source for configuration selection.
    pub fn with_selection_poller(mut self, poller: SelectionPoller) -> Self {
        self.selection_poller = Some(poller);
        self
    }

    /// Handle to the scheduler, for registering subsystems and inspecting
    /// the queue.
    pub fn scheduler(&self) -> TaskScheduler {
        self.ctx.scheduler.clone()
    }

    /// Loop controls handle.
    pub fn controls(&self) -> OpModeControls {
        self.ctx.controls()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> OpModePhase {
        self.ctx.phase
    }

    /// Run the OpMode to completion.
    ///
    /// Hook failures are absorbed as described in the module docs. The
    /// terminating phase always runs, even when the run body fails; an
    /// error from the body or the stop hook propagates to the caller.
    pub fn run(&mut self, host: &mut dyn Host) -> OpModeResult<()> {
        let body = self.run_phases(host);
        let cleanup = self.terminate();
        match (body, cleanup) {
            (Err(e), cleanup) => {
                if let Err(c) = cleanup {
                    error!("stop hook also failed: {c}");
                }
                error!("opmode run failed: {e}");
                Err(e)
            }
            (Ok(()), Err(c)) => Err(c),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    fn run_phases(&mut self, host: &mut dyn Host) -> OpModeResult<()> {
        self.transition(OpModePhase::Setup);

        // static_init: user hardware init. Failures must not prevent
        // operator feedback, so the phase chain proceeds regardless.
        self.transition(OpModePhase::StaticInit);
        if let Err(e) = self.opmode.on_init(&mut self.ctx) {
            warn!("init hook failed: {e:#}");
        }
        self.spawn_selection_worker();

        // dynamic_init: loop the init hook until it signals done (and any
        // selection has resolved), or the operator ends the init phase.
        self.transition(OpModePhase::DynamicInit);
        while !host.stop_requested() && !host.start_requested() {
            let done = match self.opmode.on_init_loop(&mut self.ctx) {
                Ok(done) => done,
                Err(e) => {
                    warn!("init loop hook failed: {e:#}");
                    false
                }
            };
            if done && self.selection_resolved() {
                break;
            }
            host.idle();
        }
        // The transition out blocks until the selection thread terminates.
        self.join_selection_worker();

        self.transition(OpModePhase::FinishInit);
        if let Err(e) = self.opmode.on_init_done(&mut self.ctx) {
            warn!("init done hook failed: {e:#}");
        }

        // Hold here until play; the ready phase itself has no duration.
        while !host.start_requested() {
            if host.stop_requested() {
                return Ok(());
            }
            self.push_status("Ready.");
            host.idle();
        }

        // ready: the task-list callback runs first, then the staged tasks
        // flush around it, atomically with this transition.
        self.transition(OpModePhase::Ready);
        let scheduler = self.ctx.scheduler.clone();
        let selection = self.selection.clone();
        let opmode = self.opmode.as_mut();
        let ctx = &mut self.ctx;
        scheduler.enter_ready(move |_| opmode.on_ready(ctx, &selection));

        // starting: timers reset, one-time start hook.
        self.transition(OpModePhase::Starting);
        self.ctx.started_at = Some(self.ctx.clock.now());
        self.ctx.halted_at = None;
        self.ctx.halted_total = Duration::ZERO;
        self.ctx.ticks = 0;
        if let Err(e) = self.opmode.on_start(&mut self.ctx) {
            warn!("start hook failed: {e:#}");
        }

        self.transition(OpModePhase::Running);
        loop {
            if host.stop_requested() {
                return Ok(());
            }
            if self.ctx.controls.is_halted() {
                // Frozen loop body: no hooks, no tasks, no timer updates.
                if self.ctx.halted_at.is_none() {
                    self.ctx.halted_at = Some(self.ctx.clock.now());
                }
                host.idle();
                continue;
            }
            if let Some(halted_at) = self.ctx.halted_at.take() {
                let span = self.ctx.clock.now().saturating_sub(halted_at);
                self.ctx.halted_total += span;
                debug!("resumed after {span:?} halted");
            }
            if let Err(e) = self.opmode.periodic(&mut self.ctx) {
                warn!("periodic hook failed: {e:#}");
            }
            if self.ctx.controls.finish_requested() {
                break;
            }
            match self.ctx.scheduler.tick(self.sink.as_mut()) {
                Ok(TickOutcome::Running) => {}
                Ok(TickOutcome::Complete) => break,
                Err(e) => return Err(e.into()),
            }
            self.ctx.ticks += 1;
            host.idle();
        }

        // finished: the loop keeps spinning so status stays visible.
        self.transition(OpModePhase::Finished);
        while !host.stop_requested() {
            self.push_status("Finished.");
            host.idle();
        }
        Ok(())
    }

    /// Terminating phase: background threads stopped, claims dropped, stop
    /// hook invoked. The stop hook is deliberately not failure-isolated.
    fn terminate(&mut self) -> OpModeResult<()> {
        self.transition(OpModePhase::Terminating);
        if let Some(worker) = self.selection_worker.take() {
            worker.join();
        }
        self.ctx.scheduler.registry().release_all();
        self.opmode
            .on_stop(&mut self.ctx)
            .map_err(OpModeError::StopHook)
    }

    fn transition(&mut self, next: OpModePhase) {
        debug_assert!(
            next > self.ctx.phase,
            "lifecycle phase regression: {} -> {next}",
            self.ctx.phase
        );
        debug!("phase: {} -> {next}", self.ctx.phase);
        self.ctx.phase = next;
    }

    fn spawn_selection_worker(&mut self) {
        let options = std::mem::take(&mut self.ctx.options);
        match options.len() {
            0 => self.selection = Selection::Empty,
            1 => {
                let only = options.into_iter().next().unwrap_or_default();
                debug!("single option '{only}', skipping selection");
                self.selection = Selection::Chosen(only);
            }
            _ => match self.selection_poller.take() {
                Some(poller) => {
                    self.selection_worker = Some(UserSelection::spawn(options, poller));
                }
                None => {
                    warn!("options declared but no selection poller provided");
                    self.selection = Selection::Unselected;
                }
            },
        }
    }

    fn selection_resolved(&self) -> bool {
        match &self.selection_worker {
            Some(worker) => worker.is_finished(),
            None => true,
        }
    }

    fn join_selection_worker(&mut self) {
        if let Some(worker) = self.selection_worker.take() {
            worker.signal_init_over();
            self.selection = worker.join();
        }
    }

    fn push_status(&mut self, line: &str) {
        if let Err(e) = self.sink.status(line) {
            warn!("status sink failed: {e:#}");
        }
    }
}

impl std::fmt::Debug for OpModeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpModeRunner")
            .field("phase", &self.ctx.phase)
            .field("selection", &self.selection)
            .finish()
    }
}
