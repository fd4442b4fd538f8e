// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-threaded cooperative scheduler.
//!
//! Owns the job queue, the task table and the parking registry. Each
//! tick pops one job and polls it to its next suspension point. A fixed
//! cadence drives the ticks (`run`); tests and hosts can also drive them
//! directly (`tick`, `run_until_idle`, `block_on`).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::Poll;
use std::thread;

use crate::channel::Chan;
use crate::config::SchedulerConfig;
use crate::error::{Fault, RuntimeError};
use crate::park::{ChanId, ParkingRegistry, SharedRegistry};
use crate::queue::JobQueue;
use crate::stop::StopToken;
use crate::task::{FaultHook, Job, LocalBoxFuture, TaskId, TaskState};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The job queue was empty.
    Idle,
    /// The job ran to completion.
    Completed(TaskId),
    /// The job suspended on a channel operation and is now parked.
    Parked(TaskId),
    /// The job yielded and went back on the queue.
    Requeued(TaskId),
    /// The job panicked; it was discarded and its fault delivered.
    Faulted(TaskId),
}

impl TickOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, TickOutcome::Idle)
    }

    /// The job this tick ran, if any.
    pub fn task(&self) -> Option<TaskId> {
        match *self {
            TickOutcome::Idle => None,
            TickOutcome::Completed(id)
            | TickOutcome::Parked(id)
            | TickOutcome::Requeued(id)
            | TickOutcome::Faulted(id) => Some(id),
        }
    }
}

/// Counters since the scheduler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    /// Ticks that found the job queue empty.
    pub idle_ticks: u64,
    /// Job polls. A parked job adds nothing here until it is unparked.
    pub polls: u64,
    pub spawned: u64,
    pub completed: u64,
    pub faulted: u64,
    /// Jobs discarded by `shutdown`.
    pub abandoned: u64,
    /// Channel operations that had to park.
    pub parks: u64,
    /// Parked operations woken by a counterpart.
    pub unparks: u64,
}

/// Scheduler handle. Clones share the same queues.
///
/// A job that needs to spawn should capture a `WeakScheduler`: a strong
/// handle inside a job keeps the scheduler alive until `shutdown`.
/// Dropping the last handle abandons every remaining job.
///
/// Not `Send`: jobs, channels and the scheduler all live on one thread.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

/// Non-owning scheduler handle for use inside jobs.
#[derive(Clone)]
pub struct WeakScheduler {
    inner: Weak<Inner>,
}

impl WeakScheduler {
    /// `None` once the scheduler has been dropped.
    pub fn upgrade(&self) -> Option<Scheduler> {
        self.inner.upgrade().map(|inner| Scheduler { inner })
    }
}

impl fmt::Debug for WeakScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakScheduler")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

struct Inner {
    config: SchedulerConfig,
    queue: Arc<JobQueue>,
    jobs: RefCell<BTreeMap<TaskId, Job>>,
    registry: SharedRegistry,
    next_task: Cell<u64>,
    next_chan: Cell<u64>,
    stats: Cell<SchedulerStats>,
    /// Set while a job is being polled.
    in_tick: Cell<bool>,
    stop: Arc<StopToken>,
}

impl Inner {
    fn bump(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Drop every job, delivering `Fault::Abandoned` to each.
    fn abandon_all(&self) -> usize {
        self.queue.drain_all();
        self.registry.borrow_mut().clear();
        // Take the table first: dropping a job may drop channels and wakers.
        let jobs = std::mem::take(&mut *self.jobs.borrow_mut());
        let abandoned = jobs.len();
        for (_, job) in jobs {
            tracing::trace!(task = %job.id(), "abandoned");
            job.fail(Fault::Abandoned);
        }
        self.queue.drain_all();
        self.bump(|s| s.abandoned += abandoned as u64);
        abandoned
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let abandoned = self.abandon_all();
        if abandoned > 0 {
            tracing::debug!(abandoned, "scheduler dropped with live jobs");
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                queue: Arc::new(JobQueue::new()),
                jobs: RefCell::new(BTreeMap::new()),
                registry: Rc::new(RefCell::new(ParkingRegistry::new())),
                next_task: Cell::new(1),
                next_chan: Cell::new(1),
                stats: Cell::new(SchedulerStats::default()),
                in_tick: Cell::new(false),
                stop: Arc::new(StopToken::new()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Create a bounded channel.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn chan<T>(&self, capacity: usize) -> Chan<T> {
        assert!(capacity >= 1, "channel capacity must be at least 1");
        self.make_chan(Some(capacity))
    }

    /// Create a channel whose puts never park.
    pub fn unbounded<T>(&self) -> Chan<T> {
        self.make_chan(None)
    }

    fn make_chan<T>(&self, capacity: Option<usize>) -> Chan<T> {
        let id = ChanId(self.inner.next_chan.get());
        self.inner.next_chan.set(id.0 + 1);
        Chan::new(id, capacity, self.inner.registry.clone())
    }

    /// Register a job and put it at the back of the queue.
    pub(crate) fn spawn_job(&self, future: LocalBoxFuture, on_fault: Option<FaultHook>) -> TaskId {
        let id = TaskId(self.inner.next_task.get());
        self.inner.next_task.set(id.0 + 1);
        self.inner
            .jobs
            .borrow_mut()
            .insert(id, Job::new(id, future, on_fault));
        self.inner.queue.push(id);
        self.inner.bump(|s| s.spawned += 1);
        tracing::debug!(task = %id, "spawned");
        id
    }

    /// Run one job to its next suspension point.
    ///
    /// A panic inside the job is caught here, logged, and turned into a
    /// `Fault` on the job's channel; the scheduler keeps going.
    pub fn tick(&self) -> TickOutcome {
        let inner = &*self.inner;
        if inner.in_tick.get() {
            tracing::warn!("tick requested from inside a running job, ignored");
            return TickOutcome::Idle;
        }

        inner.bump(|s| s.ticks += 1);
        let Some(id) = inner.queue.pop() else {
            inner.bump(|s| s.idle_ticks += 1);
            return TickOutcome::Idle;
        };
        tracing::trace!(task = %id, "tick");

        let job = inner.jobs.borrow_mut().remove(&id);
        let Some(mut job) = job else {
            tracing::warn!(task = %id, "queued job missing from task table");
            return TickOutcome::Idle;
        };

        job.header.set_state(TaskState::Running);
        inner.in_tick.set(true);
        let polled = panic::catch_unwind(AssertUnwindSafe(|| job.poll(&inner.queue)));
        inner.in_tick.set(false);
        inner.bump(|s| s.polls += 1);

        match polled {
            Ok(Poll::Ready(())) => {
                job.header.set_state(TaskState::Done);
                inner.bump(|s| s.completed += 1);
                tracing::debug!(task = %id, "completed");
                TickOutcome::Completed(id)
            }
            Ok(Poll::Pending) => {
                let parked = job.header.park();
                inner.jobs.borrow_mut().insert(id, job);
                if parked {
                    tracing::trace!(task = %id, "parked");
                    TickOutcome::Parked(id)
                } else {
                    inner.queue.push(id);
                    TickOutcome::Requeued(id)
                }
            }
            Err(payload) => {
                let fault = Fault::from_panic(payload);
                tracing::error!(task = %id, %fault, "job faulted");
                inner.bump(|s| s.faulted += 1);
                job.fail(fault);
                TickOutcome::Faulted(id)
            }
        }
    }

    /// Tick back to back until the job queue is empty. Returns the number
    /// of ticks run. Parked jobs stay parked.
    pub fn run_until_idle(&self) -> u64 {
        if self.inner.in_tick.get() {
            tracing::warn!("run_until_idle called from inside a running job, ignored");
            return 0;
        }
        let mut ticks = 0;
        while !self.inner.queue.is_empty() {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    /// Tick back to back until `chan` yields a value.
    ///
    /// Fails with `Stalled` when the queue runs dry first: every remaining
    /// job is parked and nothing can put to `chan` any more.
    pub fn block_on<T>(&self, chan: &Chan<T>) -> Result<T, RuntimeError> {
        if self.inner.in_tick.get() {
            return Err(RuntimeError::Reentrant);
        }
        loop {
            if let Some(value) = chan.poll() {
                return Ok(value);
            }
            if self.tick().is_idle() && self.inner.queue.is_empty() {
                return Err(RuntimeError::Stalled {
                    parked: self.parked_jobs(),
                });
            }
        }
    }

    /// Tick driver: one tick every `tick_interval` until stopped.
    ///
    /// Ticks are paced regardless of whether there is work. Returns when
    /// the stop token fires, or when the queue is empty if
    /// `stop_when_idle` is set. Returns the number of ticks run.
    pub fn run(&self) -> u64 {
        if self.inner.in_tick.get() {
            tracing::warn!("run called from inside a running job, ignored");
            return 0;
        }
        let interval = self.inner.config.tick_interval;
        let stop = &self.inner.stop;
        tracing::debug!(?interval, "tick driver started");

        let mut ticks = 0;
        while !stop.is_stopped() {
            if self.inner.config.stop_when_idle && self.inner.queue.is_empty() {
                break;
            }
            self.tick();
            ticks += 1;
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }

        if stop.is_stopped() {
            // Consumed; the driver can be started again.
            stop.reset();
        }
        tracing::debug!(ticks, "tick driver stopped");
        ticks
    }

    /// Token that stops `run` from any thread.
    pub fn stop_token(&self) -> Arc<StopToken> {
        self.inner.stop.clone()
    }

    /// Stop `run` after the current tick. Callable from inside a job.
    pub fn stop(&self) {
        self.inner.stop.stop();
    }

    /// Stop the driver and discard every remaining job.
    ///
    /// Each discarded job's channel receives `Err(Fault::Abandoned)`.
    /// Returns how many jobs were discarded.
    pub fn shutdown(&self) -> usize {
        let inner = &*self.inner;
        inner.stop.stop();
        if inner.in_tick.get() {
            tracing::warn!("shutdown requested from inside a running job, only stopping the driver");
            return 0;
        }

        let abandoned = inner.abandon_all();
        tracing::debug!(abandoned, "scheduler shut down");
        abandoned
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.inner.stats.get();
        let registry = self.inner.registry.borrow();
        stats.parks = registry.parks();
        stats.unparks = registry.unparks();
        stats
    }

    /// Jobs waiting on the queue for a tick.
    pub fn pending_jobs(&self) -> usize {
        self.inner.queue.len()
    }

    /// Jobs parked on a channel operation.
    pub fn parked_jobs(&self) -> usize {
        self.inner
            .jobs
            .borrow()
            .values()
            .filter(|job| job.header.state() == TaskState::Parked)
            .count()
    }

    /// Jobs spawned and not yet finished.
    pub fn live_jobs(&self) -> usize {
        self.inner.jobs.borrow().len()
    }

    /// Parked channel operations across all channels.
    pub fn parked_operations(&self) -> usize {
        self.inner.registry.borrow().total()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_jobs())
            .field("live", &self.live_jobs())
            .field("registry", &*self.inner.registry.borrow())
            .finish()
    }
}
