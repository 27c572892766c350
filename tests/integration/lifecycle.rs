//! Lifecycle phase ordering, hook failure isolation, and halt semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use roboloop::opmode::{OpMode, OpModeContext, OpModePhase, OpModeRunner, Selection};
use roboloop::task::{Action, Task, Timeout};
use roboloop::util::ManualClock;
use roboloop::{OpModeError, Subsystem};

use crate::harness::ScriptedHost;

/// Records the phase seen by each hook as it fires.
struct PhaseLogger {
    seen: Arc<Mutex<Vec<String>>>,
}

impl PhaseLogger {
    fn log(&self, ctx: &OpModeContext) {
        self.seen.lock().push(ctx.phase().to_string());
    }
}

impl OpMode for PhaseLogger {
    fn on_init(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        self.log(ctx);
        Ok(())
    }

    fn on_init_loop(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<bool> {
        self.log(ctx);
        Ok(true)
    }

    fn on_init_done(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        self.log(ctx);
        Ok(())
    }

    fn on_ready(&mut self, ctx: &mut OpModeContext, _selection: &Selection) -> anyhow::Result<()> {
        self.log(ctx);
        Ok(())
    }

    fn on_start(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        self.log(ctx);
        Ok(())
    }

    fn periodic(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        self.log(ctx);
        Ok(())
    }

    fn on_stop(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        self.log(ctx);
        Ok(())
    }
}

#[test]
fn test_phases_run_in_order_without_skips() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut runner = OpModeRunner::new(PhaseLogger { seen: seen.clone() }, ManualClock::shared());
    let mut host = ScriptedHost::new(2, 6);

    runner.run(&mut host).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            "static_init",
            "dynamic_init",
            "finish_init",
            "ready",
            "starting",
            "running",
            "terminating",
        ]
    );
    assert_eq!(runner.phase(), OpModePhase::Terminating);
}

/// A user init hook failing must not stop the lifecycle from reaching the
/// later phases, and must not surface to the caller of `run`.
struct FailingInit {
    reached: Arc<Mutex<Vec<&'static str>>>,
}

impl OpMode for FailingInit {
    fn on_init(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Err(anyhow!("encoder offline"))
    }

    fn on_ready(&mut self, _ctx: &mut OpModeContext, _selection: &Selection) -> anyhow::Result<()> {
        self.reached.lock().push("ready");
        Ok(())
    }

    fn periodic(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        self.reached.lock().push("running");
        Ok(())
    }
}

#[test]
fn test_init_hook_failure_is_not_fatal() {
    let reached = Arc::new(Mutex::new(Vec::new()));
    let mut runner = OpModeRunner::new(
        FailingInit {
            reached: reached.clone(),
        },
        ManualClock::shared(),
    );
    let mut host = ScriptedHost::new(0, 4);

    runner.run(&mut host).unwrap();

    assert_eq!(*reached.lock(), vec!["ready", "running"]);
}

struct FailingStop;

impl OpMode for FailingStop {
    fn on_init(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Err(anyhow!("servo stuck"))
    }
}

#[test]
fn test_stop_hook_failure_propagates() {
    let mut runner = OpModeRunner::new(FailingStop, ManualClock::shared());
    let mut host = ScriptedHost::new(0, 4);

    let err = runner.run(&mut host).unwrap_err();
    assert!(matches!(err, OpModeError::StopHook(_)));
}

struct CountingAction {
    ticks: Arc<AtomicUsize>,
    limit: usize,
}

impl Action for CountingAction {
    fn on_tick(&mut self) -> anyhow::Result<()> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_finished(&mut self) -> bool {
        self.ticks.load(Ordering::SeqCst) >= self.limit
    }
}

struct CountingSubsystem {
    updates: Arc<AtomicUsize>,
}

impl Subsystem for CountingSubsystem {
    fn name(&self) -> &str {
        "lift"
    }

    fn update(&mut self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

struct Halting {
    steps: Arc<AtomicUsize>,
}

impl OpMode for Halting {
    fn on_init(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_ready(&mut self, ctx: &mut OpModeContext, _selection: &Selection) -> anyhow::Result<()> {
        let task = Task::new(
            "Count",
            Timeout::Infinite,
            ctx.clock(),
            CountingAction {
                ticks: self.steps.clone(),
                limit: 6,
            },
        );
        ctx.scheduler().add_task(task.into_ref());
        Ok(())
    }
}

#[test]
fn test_halt_freezes_tasks_and_subsystems() {
    let steps = Arc::new(AtomicUsize::new(0));
    let updates = Arc::new(AtomicUsize::new(0));

    let mut runner = OpModeRunner::new(
        Halting {
            steps: steps.clone(),
        },
        ManualClock::shared(),
    );
    runner.scheduler().register_subsystem(Box::new(CountingSubsystem {
        updates: updates.clone(),
    }));

    let controls = runner.controls();
    let steps_watch = steps.clone();
    let updates_watch = updates.clone();
    let mut frozen: Option<(usize, usize)> = None;
    let mut host = ScriptedHost::new(0, 40).with_on_idle(move |n| {
        if n == 2 {
            controls.halt();
            frozen = Some((
                steps_watch.load(Ordering::SeqCst),
                updates_watch.load(Ordering::SeqCst),
            ));
        }
        if n == 5 {
            // Three halted iterations went by; nothing may have moved.
            assert_eq!(
                frozen,
                Some((
                    steps_watch.load(Ordering::SeqCst),
                    updates_watch.load(Ordering::SeqCst),
                ))
            );
            controls.resume();
        }
    });

    runner.run(&mut host).unwrap();

    assert_eq!(steps.load(Ordering::SeqCst), 6);
    assert!(updates.load(Ordering::SeqCst) > 2);
}

struct RuntimeRecorder {
    steps: Arc<AtomicUsize>,
    runtimes: Arc<Mutex<Vec<std::time::Duration>>>,
}

impl OpMode for RuntimeRecorder {
    fn on_init(&mut self, _ctx: &mut OpModeContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_ready(&mut self, ctx: &mut OpModeContext, _selection: &Selection) -> anyhow::Result<()> {
        let task = Task::new(
            "Count",
            Timeout::Infinite,
            ctx.clock(),
            CountingAction {
                ticks: self.steps.clone(),
                limit: 4,
            },
        );
        ctx.scheduler().add_task(task.into_ref());
        Ok(())
    }

    fn periodic(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        self.runtimes.lock().push(ctx.runtime());
        Ok(())
    }
}

#[test]
fn test_runtime_excludes_halted_spans() {
    use std::time::Duration;

    let clock = ManualClock::shared();
    let runtimes = Arc::new(Mutex::new(Vec::new()));
    let mut runner = OpModeRunner::new(
        RuntimeRecorder {
            steps: Arc::new(AtomicUsize::new(0)),
            runtimes: runtimes.clone(),
        },
        clock.clone(),
    );

    // The wall clock keeps moving during the halt; the run timer must not.
    let controls = runner.controls();
    let tick_clock = clock.clone();
    let mut host = ScriptedHost::new(0, 40).with_on_idle(move |n| {
        tick_clock.advance(Duration::from_millis(10));
        if n == 2 {
            controls.halt();
        }
        if n == 5 {
            controls.resume();
        }
    });

    runner.run(&mut host).unwrap();

    let runtimes = runtimes.lock();
    assert!(runtimes.len() >= 4);
    for pair in runtimes.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_millis(10));
    }
}
