// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Logical thread spawner: go/gocall/gotake/goput.
//!
//! Every spawn returns a future channel: a capacity-1 `Chan<Outcome<T>>`
//! that receives exactly one value, `Ok` when the job finishes or `Err`
//! when it faults or is abandoned.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::channel::{put, take, Chan};
use crate::error::{Fault, Outcome};
use crate::scheduler::Scheduler;
use crate::task::FaultHook;

impl Scheduler {
    /// Spawn `fut` as a logical thread. Non-blocking; the job first runs
    /// on a later tick.
    pub fn go<T, F>(&self, fut: F) -> Chan<Outcome<T>>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        self.spawn_outcome(async move { Ok(fut.await) })
    }

    /// Spawn `f(args)`. `f` is applied when the job first runs, not here.
    pub fn gocall<A, T, F, Fut>(&self, f: F, args: A) -> Chan<Outcome<T>>
    where
        A: 'static,
        T: 'static,
        F: FnOnce(A) -> Fut + 'static,
        Fut: Future<Output = T>,
    {
        self.go(async move { f(args).await })
    }

    /// Spawn a job that takes one value from `chan` and hands it to `then`.
    pub fn gotake<T, R, F>(&self, chan: &Chan<T>, then: F) -> Chan<Outcome<R>>
    where
        T: 'static,
        R: 'static,
        F: FnOnce(T) -> R + 'static,
    {
        self.go(take(chan, then))
    }

    /// Spawn a job that puts `value` on `chan`.
    pub fn goput<T>(&self, chan: &Chan<T>, value: T) -> Chan<Outcome<()>>
    where
        T: 'static,
    {
        self.goput_then(chan, value, || ())
    }

    /// Spawn a job that puts `value` on `chan`, then calls `then`.
    pub fn goput_then<T, R, F>(&self, chan: &Chan<T>, value: T, then: F) -> Chan<Outcome<R>>
    where
        T: 'static,
        R: 'static,
        F: FnOnce() -> R + 'static,
    {
        self.go(put(chan, value, then))
    }

    /// Spawn a job whose body already yields an `Outcome`. The result is
    /// delivered as-is instead of being wrapped in another `Ok`.
    pub(crate) fn spawn_outcome<T, F>(&self, fut: F) -> Chan<Outcome<T>>
    where
        T: 'static,
        F: Future<Output = Outcome<T>> + 'static,
    {
        let result: Chan<Outcome<T>> = self.chan(1);
        let done = result.clone();
        let failed = result.clone();
        let on_fault: FaultHook = Box::new(move |fault: Fault| failed.complete(Err(fault)));
        self.spawn_job(
            Box::pin(async move {
                let outcome = fut.await;
                done.complete(outcome);
            }),
            Some(on_fault),
        );
        result
    }
}

/// Give up the rest of this tick. The job goes to the back of the queue.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by `yield_now`.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TickOutcome;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn go_round_trip() {
        let sched = Scheduler::new();
        let result = sched.go(async { 42 });
        assert!(result.is_empty());
        assert_eq!(sched.block_on(&result), Ok(Ok(42)));
    }

    #[test]
    fn go_does_not_run_eagerly() {
        let sched = Scheduler::new();
        let ran = Rc::new(RefCell::new(false));
        let flag = ran.clone();
        let _result = sched.go(async move { *flag.borrow_mut() = true });
        assert!(!*ran.borrow());
        sched.tick();
        assert!(*ran.borrow());
    }

    #[test]
    fn gocall_applies_lazily() {
        let sched = Scheduler::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let result = sched.gocall(
            move |(a, b): (i32, i32)| {
                *counter.borrow_mut() += 1;
                async move { a * b }
            },
            (6, 7),
        );
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(sched.block_on(&result), Ok(Ok(42)));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn gotake_and_goput_meet() {
        let sched = Scheduler::new();
        let c: Chan<&str> = sched.chan(1);
        let taken = sched.gotake(&c, |v| v.len());
        let sent = sched.goput(&c, "hello");
        assert_eq!(sched.block_on(&taken), Ok(Ok(5)));
        assert_eq!(sched.block_on(&sent), Ok(Ok(())));
    }

    #[test]
    fn goput_then_runs_after_put() {
        let sched = Scheduler::new();
        let c: Chan<u8> = sched.chan(1);
        let observer = c.clone();
        let after = sched.goput_then(&c, 9, move || observer.len());
        assert_eq!(sched.block_on(&after), Ok(Ok(1)));
    }

    #[test]
    fn panic_reaches_future_channel() {
        let sched = Scheduler::new();
        let result = sched.go(async {
            if true {
                panic!("exploded");
            }
            1
        });
        assert_eq!(
            sched.block_on(&result),
            Ok(Err(Fault::Panicked {
                message: "exploded".to_string()
            }))
        );
    }

    #[test]
    fn yield_requeues_at_back() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a_log = log.clone();
        let a = sched.go(async move {
            a_log.borrow_mut().push("a1");
            yield_now().await;
            a_log.borrow_mut().push("a2");
        });
        let b_log = log.clone();
        let _b = sched.go(async move { b_log.borrow_mut().push("b") });

        assert!(matches!(sched.tick(), TickOutcome::Requeued(_)));
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec!["a1", "b", "a2"]);
        assert_eq!(a.poll(), Some(Ok(())));
    }
}
