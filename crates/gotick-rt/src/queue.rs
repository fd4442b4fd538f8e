// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Job queue: FIFO of runnable job ids.
//!
//! Mutex-protected VecDeque. Everything runs on one thread, but wakers
//! must be `Send + Sync`, so the queue they push into is too.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::task::TaskId;

/// Unbounded FIFO of jobs ready for the next tick.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    queue: Mutex<VecDeque<TaskId>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    // No code panics while holding the lock, so a poisoned queue is intact.
    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskId>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append at the back.
    pub fn push(&self, id: TaskId) {
        self.lock().push_back(id);
    }

    /// Pop the oldest entry.
    pub fn pop(&self) -> Option<TaskId> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove everything (used during shutdown).
    pub fn drain_all(&self) -> Vec<TaskId> {
        self.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let q = JobQueue::new();
        q.push(TaskId(1));
        q.push(TaskId(2));
        q.push(TaskId(3));
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(TaskId(1)));
        assert_eq!(q.pop(), Some(TaskId(2)));
        assert_eq!(q.pop(), Some(TaskId(3)));
        assert!(q.pop().is_none());
    }

    #[test]
    fn drain_empties() {
        let q = JobQueue::new();
        for i in 0..5 {
            q.push(TaskId(i));
        }
        let drained = q.drain_all();
        assert_eq!(drained.len(), 5);
        assert!(q.is_empty());
    }
}
