//! Scheduler unit tests
//!
//! Queue mechanics, staging-buffer flush ordering and per-tick behaviour.


use std::sync::Arc;

use crate::task::{Action, Task, TaskRef, Timeout};
use crate::telemetry::StatusSink;
use crate::util::{ManualClock, SharedClock};

/// Action with no behaviour, for queue-shape tests.
struct Noop;
impl Action for Noop {}

/// A never-finishing task with a recognizable name.
fn named(clock: &SharedClock, name: &str) -> TaskRef {
    Task::new(name, Timeout::Infinite, clock.clone(), Noop).into_ref()
}

fn manual() -> (Arc<ManualClock>, SharedClock) {
    let clock = ManualClock::shared();
    let shared: SharedClock = clock.clone();
    (clock, shared)
}

/// Sink capturing every status line.
#[derive(Default)]
struct VecSink {
    lines: Vec<String>,
}

impl StatusSink for VecSink {
    fn status(&mut self, line: &str) -> anyhow::Result<()> {
        self.lines.push(line.to_owned());
        Ok(())
    }
}

/// Sink that always fails, to prove sink errors never abort a tick.
struct BrokenSink;

impl StatusSink for BrokenSink {
    fn status(&mut self, _line: &str) -> anyhow::Result<()> {
        anyhow::bail!("transport down")
    }
}

mod deque {
    use super::*;
    use crate::scheduler::TaskDeque;
    use proptest::prelude::*;

    #[test]
    fn test_deque_fifo_order() {
        let (_, clock) = manual();
        let deque = TaskDeque::new();
        deque.push_back(named(&clock, "a"));
        deque.push_back(named(&clock, "b"));
        deque.push_front(named(&clock, "front"));

        let names: Vec<String> = deque
            .snapshot()
            .iter()
            .map(|t| t.lock().name().to_owned())
            .collect();
        assert_eq!(names, ["front", "a", "b"]);
    }

    #[test]
    fn test_deque_insert_bounds() {
        let (_, clock) = manual();
        let deque = TaskDeque::new();
        deque.push_back(named(&clock, "a"));
        assert!(deque.insert(1, named(&clock, "b")));
        assert!(!deque.insert(5, named(&clock, "nope")));
        assert_eq!(deque.len(), 2);
    }

    #[test]
    fn test_deque_remove_ref_identity() {
        let (_, clock) = manual();
        let deque = TaskDeque::new();
        let a = named(&clock, "a");
        let ghost = named(&clock, "a");
        deque.push_back(a.clone());
        // Same name, different identity: not removed.
        assert!(!deque.remove_ref(&ghost));
        assert!(deque.remove_ref(&a));
        assert!(deque.is_empty());
    }

    proptest! {
        /// Positional insert puts the task at exactly the requested index
        /// and shifts only the tasks at or beyond it.
        #[test]
        fn prop_insert_is_positional(len in 0usize..8, index in 0usize..8) {
            prop_assume!(index <= len);
            let (_, clock) = manual();
            let deque = TaskDeque::new();
            for i in 0..len {
                deque.push_back(named(&clock, &format!("t{i}")));
            }
            deque.insert(index, named(&clock, "new"));

            let names: Vec<String> = deque
                .snapshot()
                .iter()
                .map(|t| t.lock().name().to_owned())
                .collect();
            prop_assert_eq!(names.len(), len + 1);
            prop_assert_eq!(&names[index], "new");
            for (i, name) in names.iter().enumerate() {
                if i < index {
                    prop_assert_eq!(name, &format!("t{i}"));
                } else if i > index {
                    prop_assert_eq!(name, &format!("t{}", i - 1));
                }
            }
        }
    }
}
