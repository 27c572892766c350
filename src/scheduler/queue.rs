//! Pending task deque
//!
//! Thread-safe double-ended queue of task handles with stable positional
//! insert and remove. Every operation takes the inner lock for its full
//! duration, so mutations from a task's own step callback and from the main
//! loop are serialized; the lock is never held across user code.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::task::TaskRef;

/// A thread-safe deque of pending tasks.
#[derive(Debug, Default)]
pub struct TaskDeque {
    /// Inner deque protected by mutex
    inner: Arc<Mutex<VecDeque<TaskRef>>>,
}

impl TaskDeque {
    /// Create a new empty deque.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a task to the back of the queue.
    #[inline]
    pub fn push_back(&self, task: TaskRef) {
        self.inner.lock().push_back(task);
    }

    /// Push a task to the front of the queue.
    #[inline]
    pub fn push_front(&self, task: TaskRef) {
        self.inner.lock().push_front(task);
    }

    /// Pop the head of the queue.
    #[inline]
    pub fn pop_front(&self) -> Option<TaskRef> {
        self.inner.lock().pop_front()
    }

    /// Pop the tail of the queue.
    #[inline]
    pub fn pop_back(&self) -> Option<TaskRef> {
        self.inner.lock().pop_back()
    }

    /// Peek at the head without removing it.
    #[inline]
    pub fn peek_front(&self) -> Option<TaskRef> {
        self.inner.lock().front().cloned()
    }

    /// Insert a task so that it becomes the `index`-th element, shifting
    /// everything at or beyond `index` up by one. Returns false when
    /// `index > len` and leaves the queue untouched.
    pub fn insert(&self, index: usize, task: TaskRef) -> bool {
        let mut inner = self.inner.lock();
        if index > inner.len() {
            return false;
        }
        inner.insert(index, task);
        true
    }

    /// Remove and return the task at `index`, or `None` when out of bounds.
    pub fn remove_at(&self, index: usize) -> Option<TaskRef> {
        self.inner.lock().remove(index)
    }

    /// Remove a task by handle identity. Returns whether it was present.
    pub fn remove_ref(&self, task: &TaskRef) -> bool {
        let mut inner = self.inner.lock();
        match inner.iter().position(|t| TaskRef::ptr_eq(t, task)) {
            Some(index) => {
                inner.remove(index);
                true
            }
            None => false,
        }
    }

    /// Get the number of pending tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Snapshot of the current queue order.
    pub fn snapshot(&self) -> Vec<TaskRef> {
        self.inner.lock().iter().cloned().collect()
    }
}

impl Clone for TaskDeque {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
