// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Jobs: one logical thread each.
//!
//! A job is a boxed future plus a fault hook. The scheduler owns the
//! polling; the job's waker is the only way back onto the job queue.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crate::error::Fault;
use crate::queue::JobQueue;

/// Identity of a job, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Job lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// On the job queue, waiting for a tick.
    Queued = 0,
    /// Being polled by the current tick.
    Running = 1,
    /// Waiting in the parking registry. Costs no ticks.
    Parked = 2,
    /// Finished or faulted.
    Done = 3,
    /// Woken while running; goes back on the queue when the poll returns.
    Notified = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Parked,
            4 => Self::Notified,
            _ => Self::Done,
        }
    }
}

/// Type-erased job body. Completion is folded into the future itself.
pub(crate) type LocalBoxFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Called with the fault when a job ends without completing.
pub(crate) type FaultHook = Box<dyn FnOnce(Fault)>;

/// State shared between the job and its wakers.
#[derive(Debug)]
pub(crate) struct TaskHeader {
    pub id: TaskId,
    state: AtomicU8,
}

impl TaskHeader {
    pub fn new(id: TaskId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: AtomicU8::new(TaskState::Queued as u8),
        })
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Running → Parked after a `Pending` poll. Returns false when the job
    /// was woken during the poll; it is then marked Queued and the caller
    /// must push it back on the queue.
    pub fn park(&self) -> bool {
        match self.state.compare_exchange(
            TaskState::Running as u8,
            TaskState::Parked as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(_) => {
                self.set_state(TaskState::Queued);
                false
            }
        }
    }
}

/// Waker that moves a parked job back onto the job queue.
struct TaskWaker {
    header: Arc<TaskHeader>,
    queue: Arc<JobQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let state = &self.header.state;
        let mut current = state.load(Ordering::Acquire);
        loop {
            let next = match TaskState::from_u8(current) {
                TaskState::Parked => TaskState::Queued,
                TaskState::Running => TaskState::Notified,
                // Already runnable or finished.
                TaskState::Queued | TaskState::Notified | TaskState::Done => return,
            };
            match state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if next == TaskState::Queued {
                        self.queue.push(self.header.id);
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// A spawned logical thread owned by the scheduler's task table.
pub(crate) struct Job {
    pub header: Arc<TaskHeader>,
    pub future: LocalBoxFuture,
    pub on_fault: Option<FaultHook>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.header.id)
            .field("state", &self.header.state())
            .finish()
    }
}

impl Job {
    pub fn new(id: TaskId, future: LocalBoxFuture, on_fault: Option<FaultHook>) -> Self {
        Self {
            header: TaskHeader::new(id),
            future,
            on_fault,
        }
    }

    pub fn id(&self) -> TaskId {
        self.header.id
    }

    /// Poll the body once with a waker bound to `queue`.
    pub fn poll(&mut self, queue: &Arc<JobQueue>) -> Poll<()> {
        let waker = Waker::from(Arc::new(TaskWaker {
            header: self.header.clone(),
            queue: queue.clone(),
        }));
        let mut cx = Context::from_waker(&waker);
        self.future.as_mut().poll(&mut cx)
    }

    /// Mark finished and hand `fault` to the hook, if any.
    pub fn fail(self, fault: Fault) {
        let Job {
            header,
            future,
            on_fault,
        } = self;
        header.set_state(TaskState::Done);
        // Parked channel operations inside the body deregister on drop,
        // before the fault is delivered.
        drop(future);
        if let Some(hook) = on_fault {
            hook(fault);
        }
    }
}
