// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! goloop/goconsume: loops that trampoline through the scheduler.
//!
//! Each iteration is its own job. A body ends with `recur.call(next)`,
//! which is a tail call: the iteration finishes and the driver spawns the
//! next one, handing it the loop's result channel. A loop of any length
//! never grows the native stack, holds one live job at a time, and lets
//! other jobs interleave between iterations.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;

use crate::channel::Chan;
use crate::error::{Fault, Outcome};
use crate::scheduler::Scheduler;
use crate::task::FaultHook;

/// What one loop iteration decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<S, T> {
    /// Run another iteration from this state.
    Continue(S),
    /// End the loop with this value.
    Done(T),
}

type BoxStep<S, T> = Pin<Box<dyn Future<Output = Step<S, T>>>>;
type Body<S, T> = Rc<dyn Fn(Recur<S, T>, S) -> BoxStep<S, T>>;

/// Handle a loop body uses to continue with a new state.
pub struct Recur<S, T> {
    iteration: u64,
    _marker: PhantomData<fn(S) -> T>,
}

impl<S, T> Recur<S, T> {
    fn new(iteration: u64) -> Self {
        Self {
            iteration,
            _marker: PhantomData,
        }
    }

    /// Continue the loop from `state`. Return this from the body.
    pub fn call(self, state: S) -> Step<S, T> {
        Step::Continue(state)
    }

    /// Zero for the first iteration.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

impl<S, T> Clone for Recur<S, T> {
    fn clone(&self) -> Self {
        Self::new(self.iteration)
    }
}

impl<S, T> fmt::Debug for Recur<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recur")
            .field("iteration", &self.iteration)
            .finish()
    }
}

/// Spawn one iteration. On `Continue` it spawns its successor before
/// finishing; on `Done` or a fault it fills `result`.
fn spawn_iteration<S, T>(
    sched: &Scheduler,
    body: Body<S, T>,
    result: Chan<Outcome<T>>,
    state: S,
    iteration: u64,
) where
    S: 'static,
    T: 'static,
{
    let weak = sched.downgrade();
    let failed = result.clone();
    let on_fault: FaultHook = Box::new(move |fault: Fault| failed.complete(Err(fault)));
    sched.spawn_job(
        Box::pin(async move {
            match body(Recur::new(iteration), state).await {
                Step::Done(value) => result.complete(Ok(value)),
                Step::Continue(next) => match weak.upgrade() {
                    Some(sched) => spawn_iteration(&sched, body, result, next, iteration + 1),
                    None => result.complete(Err(Fault::Abandoned)),
                },
            }
        }),
        Some(on_fault),
    );
}

impl Scheduler {
    /// Spawn a loop starting at `initial`.
    ///
    /// `f(recur, state)` is one iteration. It resolves to `Step::Done(value)`
    /// to end the loop or to `recur.call(next)` to run again from `next`.
    /// The returned future channel receives the final value, or the fault
    /// of whichever iteration failed.
    pub fn goloop<S, T, F, Fut>(&self, f: F, initial: S) -> Chan<Outcome<T>>
    where
        S: 'static,
        T: 'static,
        F: Fn(Recur<S, T>, S) -> Fut + 'static,
        Fut: Future<Output = Step<S, T>> + 'static,
    {
        let body: Body<S, T> =
            Rc::new(move |recur, state| Box::pin(f(recur, state)) as BoxStep<S, T>);
        let result = self.chan(1);
        spawn_iteration(self, body, result.clone(), initial, 0);
        result
    }

    /// Spawn a single-consumer loop over `chan`.
    ///
    /// Each iteration takes one value, then runs `f(value, recur, state)`.
    /// The next value is taken only by the iteration `recur.call` starts.
    pub fn goconsume<V, S, T, F, Fut>(&self, chan: &Chan<V>, f: F, initial: S) -> Chan<Outcome<T>>
    where
        V: 'static,
        S: 'static,
        T: 'static,
        F: Fn(V, Recur<S, T>, S) -> Fut + 'static,
        Fut: Future<Output = Step<S, T>> + 'static,
    {
        let chan = chan.clone();
        let f = Rc::new(f);
        let body: Body<S, T> = Rc::new(move |recur, state| {
            let value = chan.take();
            let f = f.clone();
            Box::pin(async move { f(value.await, recur, state).await }) as BoxStep<S, T>
        });
        let result = self.chan(1);
        spawn_iteration(self, body, result.clone(), initial, 0);
        result
    }
}
