//! Full autonomous run: staged tasks, operator start, queue drain, status
//! reporting, and subsystem dispatch.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roboloop::opmode::{OpMode, OpModeContext, OpModeRunner, Selection};
use roboloop::task::{condition_task, run_task, wait_task, Timeout};
use roboloop::util::ManualClock;
use roboloop::Subsystem;

use crate::harness::{ScriptedHost, VecSink};

struct Drive {
    updates: Arc<AtomicUsize>,
}

impl Subsystem for Drive {
    fn name(&self) -> &str {
        "drive"
    }

    fn update(&mut self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stages a wait before the queue and a condition after it during init,
/// then adds the claw trigger from the ready callback. Expected final
/// order: Wait, Run, Condition.
struct Auto {
    fired: Arc<AtomicBool>,
}

impl OpMode for Auto {
    fn on_init(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        let clock = ctx.clock();
        ctx.scheduler()
            .add_task_first(wait_task(clock.clone(), Duration::from_millis(100)).into_ref());
        let fired = self.fired.clone();
        ctx.scheduler().add_task_last(
            condition_task(clock, Timeout::Infinite, move || fired.load(Ordering::SeqCst))
                .into_ref(),
        );
        Ok(())
    }

    fn on_ready(&mut self, ctx: &mut OpModeContext, selection: &Selection) -> anyhow::Result<()> {
        assert_eq!(*selection, Selection::Empty);
        let fired = self.fired.clone();
        ctx.scheduler().add_task(
            run_task(ctx.clock(), move || fired.store(true, Ordering::SeqCst)).into_ref(),
        );
        Ok(())
    }
}

#[test]
fn test_autonomous_run_drains_queue_in_order() {
    let clock = ManualClock::shared();
    let fired = Arc::new(AtomicBool::new(false));
    let updates = Arc::new(AtomicUsize::new(0));

    let (sink, lines) = VecSink::shared();
    let mut runner = OpModeRunner::new(
        Auto {
            fired: fired.clone(),
        },
        clock.clone(),
    )
    .with_sink(Box::new(sink));
    runner.scheduler().register_subsystem(Box::new(Drive {
        updates: updates.clone(),
    }));

    let tick_clock = clock.clone();
    let mut host = ScriptedHost::new(1, 60).with_on_idle(move |_| {
        tick_clock.advance(Duration::from_millis(50));
    });

    runner.run(&mut host).unwrap();
    assert!(fired.load(Ordering::SeqCst));

    let lines = lines.lock();
    assert!(lines.iter().any(|l| l == "Ready."));
    assert!(lines.iter().any(|l| l == "Finished."));

    let mut progress: Vec<&str> = lines
        .iter()
        .filter(|l| l.starts_with("Running task"))
        .map(String::as_str)
        .collect();
    progress.dedup();
    assert_eq!(
        progress,
        vec![
            "Running task (1/3): Wait",
            "Running task (2/3): Run",
            "Running task (3/3): Condition",
        ]
    );

    // One subsystem dispatch per running tick, none after completion.
    let running_ticks = lines.iter().filter(|l| l.starts_with("Running task")).count();
    assert_eq!(updates.load(Ordering::SeqCst), running_ticks);
}

/// Declares two starting positions and checks that the operator's pick
/// arrives in the ready callback.
struct Selectable {
    chosen: Arc<parking_lot::Mutex<Option<Selection>>>,
}

impl OpMode for Selectable {
    fn on_init(&mut self, ctx: &mut OpModeContext) -> anyhow::Result<()> {
        ctx.set_options(vec!["Left".to_owned(), "Right".to_owned()]);
        Ok(())
    }

    fn on_ready(&mut self, _ctx: &mut OpModeContext, selection: &Selection) -> anyhow::Result<()> {
        *self.chosen.lock() = Some(selection.clone());
        Ok(())
    }
}

#[test]
fn test_operator_selection_reaches_ready_hook() {
    let chosen = Arc::new(parking_lot::Mutex::new(None));
    let mut runner = OpModeRunner::new(
        Selectable {
            chosen: chosen.clone(),
        },
        ManualClock::shared(),
    )
    .with_selection_poller(Box::new(|options| {
        options.iter().position(|o| o == "Right")
    }));

    // Idle with a real sleep so the selection thread gets scheduled.
    let mut host = ScriptedHost::new(200, 220).with_on_idle(|_| {
        std::thread::sleep(Duration::from_millis(1));
    });

    runner.run(&mut host).unwrap();
    assert_eq!(*chosen.lock(), Some(Selection::Chosen("Right".to_owned())));
}
