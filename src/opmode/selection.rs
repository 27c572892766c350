//! Asynchronous configuration selection
//!
//! Before an autonomous program starts, the operator may pick one of several
//! user-defined configurations (say, starting positions). The
//! [`UserSelection`] worker polls an operator input source on its own thread
//! during the dynamic-init phase; the lifecycle guarantees the thread is
//! joined before the starting phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

/// The outcome of configuration selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// No options were offered; selection was skipped entirely.
    #[default]
    Empty,
    /// Options were offered but the init phase ended before a choice.
    Unselected,
    /// The operator chose this option.
    Chosen(String),
}

/// Operator input source: given the option list, report a chosen index once
/// one is available.
pub type SelectionPoller = Box<dyn FnMut(&[String]) -> Option<usize> + Send>;

/// Worker thread polling the operator for a configuration choice.
pub struct UserSelection {
    handle: Option<thread::JoinHandle<()>>,
    result: Arc<Mutex<Option<Selection>>>,
    init_over: Arc<AtomicBool>,
}

impl UserSelection {
    /// Spawn the worker over a non-empty option list.
    pub fn spawn(options: Vec<String>, mut poll: SelectionPoller) -> Self {
        let result: Arc<Mutex<Option<Selection>>> = Arc::new(Mutex::new(None));
        let init_over = Arc::new(AtomicBool::new(false));

        let worker_result = result.clone();
        let worker_init_over = init_over.clone();
        let handle = thread::Builder::new()
            .name("user-selection".to_owned())
            .spawn(move || {
                debug!("selection worker started with {} options", options.len());
                loop {
                    if worker_init_over.load(Ordering::SeqCst) {
                        debug!("selection worker: init phase over, no choice made");
                        *worker_result.lock() = Some(Selection::Unselected);
                        return;
                    }
                    if let Some(index) = poll(&options) {
                        match options.get(index) {
                            Some(option) => {
                                debug!("selection worker: operator chose '{option}'");
                                *worker_result.lock() = Some(Selection::Chosen(option.clone()));
                            }
                            None => {
                                warn!("selection worker: chosen index {index} out of range");
                                *worker_result.lock() = Some(Selection::Unselected);
                            }
                        }
                        return;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            })
            .expect("failed to spawn selection worker thread");

        Self {
            handle: Some(handle),
            result,
            init_over,
        }
    }

    /// Whether the worker has produced its result.
    pub fn is_finished(&self) -> bool {
        self.result.lock().is_some()
    }

    /// Tell the worker the init phase is over; it resolves to
    /// [`Selection::Unselected`] if no choice has been made by then.
    pub fn signal_init_over(&self) {
        self.init_over.store(true, Ordering::SeqCst);
    }

    /// Join the worker thread and take its result.
    pub fn join(mut self) -> Selection {
        self.signal_init_over();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("selection worker panicked, treating as no selection");
                return Selection::Unselected;
            }
        }
        self.result.lock().take().unwrap_or(Selection::Unselected)
    }
}

impl Drop for UserSelection {
    fn drop(&mut self) {
        // A leaked worker must still terminate.
        self.signal_init_over();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
