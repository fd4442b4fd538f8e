// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Channels and the parking take/put operations.
//!
//! A `Chan<T>` is a FIFO buffer, bounded (capacity >= 1) or unbounded.
//! `take`/`put` are futures: awaited inside a job they either complete in
//! the current tick or park in the scheduler's registry until the
//! counterpart operation on the same channel wakes them.
//!
//! First attempt: operate on the buffer directly (fast path).
//! Buffer empty/full: register the waker, return Pending.
//! On wake: retry; if beaten to it, park again as the newest waiter.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::error::Full;
use crate::park::{ChanId, SharedRegistry, Side, Ticket};

/// Channel handle. Clones refer to the same buffer.
pub struct Chan<T> {
    inner: Rc<ChanInner<T>>,
}

struct ChanInner<T> {
    id: ChanId,
    /// `None` = unbounded.
    capacity: Option<usize>,
    buffer: RefCell<VecDeque<T>>,
    registry: SharedRegistry,
}

impl<T> Chan<T> {
    pub(crate) fn new(id: ChanId, capacity: Option<usize>, registry: SharedRegistry) -> Self {
        debug_assert!(capacity != Some(0), "bounded channels need capacity >= 1");
        Self {
            inner: Rc::new(ChanInner {
                id,
                capacity,
                buffer: RefCell::new(VecDeque::new()),
                registry,
            }),
        }
    }

    pub fn id(&self) -> ChanId {
        self.inner.id
    }

    /// Buffer limit, or `None` for an unbounded channel.
    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    /// Values currently buffered.
    pub fn len(&self) -> usize {
        self.inner.buffer.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buffer.borrow().is_empty()
    }

    /// Whether a put would park right now.
    pub fn is_full(&self) -> bool {
        match self.inner.capacity {
            Some(cap) => self.len() >= cap,
            None => false,
        }
    }

    /// Jobs parked waiting to take from this channel.
    pub fn parked_takers(&self) -> usize {
        self.inner.registry.borrow().parked(Side::Take, self.inner.id)
    }

    /// Jobs parked waiting for room in this channel.
    pub fn parked_putters(&self) -> usize {
        self.inner.registry.borrow().parked(Side::Put, self.inner.id)
    }

    /// Remove and return the oldest value, or `None` when empty.
    ///
    /// Never parks. Freeing a slot in a bounded channel unparks the oldest
    /// waiting putter.
    pub fn poll(&self) -> Option<T> {
        let value = self.inner.buffer.borrow_mut().pop_front()?;
        if self.inner.capacity.is_some() {
            self.wake_one(Side::Put);
        }
        Some(value)
    }

    /// Append `value` if there is room, unparking the oldest waiting taker.
    ///
    /// Never parks. A full channel hands the value back in `Full`.
    pub fn offer(&self, value: T) -> Result<(), Full<T>> {
        {
            let mut buffer = self.inner.buffer.borrow_mut();
            if let Some(cap) = self.inner.capacity {
                if buffer.len() >= cap {
                    return Err(Full(value));
                }
            }
            buffer.push_back(value);
            debug_assert!(
                self.inner.capacity.map_or(true, |cap| buffer.len() <= cap),
                "{} holds more values than its capacity",
                self.inner.id
            );
        }
        self.wake_one(Side::Take);
        Ok(())
    }

    /// Parking take: resolves to the next value.
    pub fn take(&self) -> Take<T> {
        Take {
            chan: self.clone(),
            ticket: None,
        }
    }

    /// Parking put: resolves once `value` is in the buffer.
    pub fn put(&self, value: T) -> Put<T> {
        Put {
            chan: self.clone(),
            value: Some(value),
            ticket: None,
        }
    }

    /// Deliver a job's final value to its future channel.
    ///
    /// Only the completion writes to a future channel, so it always has
    /// room; anything else is an out-of-contract put and the value is lost.
    pub(crate) fn complete(&self, value: T) {
        if self.offer(value).is_err() {
            tracing::error!(chan = %self.inner.id, "future channel already full, result dropped");
        }
    }

    fn wake_one(&self, side: Side) {
        // Release the registry borrow before waking.
        let waker = self.inner.registry.borrow_mut().unpark(side, self.inner.id);
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn park(&self, side: Side, cx: &Context<'_>) -> Ticket {
        self.inner
            .registry
            .borrow_mut()
            .park(side, self.inner.id, cx.waker().clone())
    }

    fn still_parked(&self, side: Side, ticket: Ticket, cx: &Context<'_>) -> bool {
        self.inner
            .registry
            .borrow_mut()
            .still_parked(side, self.inner.id, ticket, cx.waker())
    }

    fn cancel(&self, side: Side, ticket: Ticket) -> bool {
        self.inner
            .registry
            .borrow_mut()
            .cancel(side, self.inner.id, ticket)
    }
}

impl<T> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Chan<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Chan<T> {}

impl<T> fmt::Debug for Chan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chan")
            .field("id", &self.inner.id)
            .field("capacity", &self.inner.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// Future returned by `Chan::take`.
///
/// Parked takers are woken oldest first. A woken take that finds the value
/// already gone, taken by a job that never parked, parks again as the
/// newest waiter: FIFO order holds among parked takers only.
#[must_use = "futures do nothing unless awaited"]
pub struct Take<T> {
    chan: Chan<T>,
    ticket: Option<Ticket>,
}

impl<T> Future for Take<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = &mut *self;

        if let Some(ticket) = this.ticket {
            if this.chan.still_parked(Side::Take, ticket, cx) {
                // Spurious poll: nobody has unparked us yet.
                return Poll::Pending;
            }
            this.ticket = None;
        }

        match this.chan.poll() {
            Some(value) => Poll::Ready(value),
            None => {
                this.ticket = Some(this.chan.park(Side::Take, cx));
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for Take<T> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            // Already unparked but never ran: hand the wake-up to the next taker.
            if !self.chan.cancel(Side::Take, ticket) && !self.chan.is_empty() {
                self.chan.wake_one(Side::Take);
            }
        }
    }
}

impl<T> fmt::Debug for Take<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Take")
            .field("chan", &self.chan.id())
            .field("parked", &self.ticket.is_some())
            .finish()
    }
}

/// Future returned by `Chan::put`.
#[must_use = "futures do nothing unless awaited"]
pub struct Put<T> {
    chan: Chan<T>,
    value: Option<T>,
    ticket: Option<Ticket>,
}

// The value is moved in and out by ownership, never pinned.
impl<T> Unpin for Put<T> {}

impl<T> Future for Put<T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;

        if let Some(ticket) = this.ticket {
            if this.chan.still_parked(Side::Put, ticket, cx) {
                return Poll::Pending;
            }
            this.ticket = None;
        }

        let Some(value) = this.value.take() else {
            return Poll::Ready(());
        };

        match this.chan.offer(value) {
            Ok(()) => Poll::Ready(()),
            Err(Full(value)) => {
                this.value = Some(value);
                this.ticket = Some(this.chan.park(Side::Put, cx));
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for Put<T> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            if !self.chan.cancel(Side::Put, ticket) && !self.chan.is_full() {
                self.chan.wake_one(Side::Put);
            }
        }
    }
}

impl<T> fmt::Debug for Put<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Put")
            .field("chan", &self.chan.id())
            .field("parked", &self.ticket.is_some())
            .finish()
    }
}

/// Non-blocking receive: the oldest value, or `None` when empty.
pub fn poll<T>(chan: &Chan<T>) -> Option<T> {
    chan.poll()
}

/// Take one value from `chan`, then continue with `resume_with`.
///
/// Only meaningful inside a job: the scheduler parks the job until a
/// value is available.
pub fn take<T, R, F>(chan: &Chan<T>, resume_with: F) -> impl Future<Output = R>
where
    F: FnOnce(T) -> R,
{
    let op = chan.take();
    async move { resume_with(op.await) }
}

/// Put `value` on `chan`, then continue with `resume_with`.
///
/// Parks the job while the channel is full. Use `Chan::put` for a
/// no-op continuation.
pub fn put<T, R, F>(chan: &Chan<T>, value: T, resume_with: F) -> impl Future<Output = R>
where
    F: FnOnce() -> R,
{
    let op = chan.put(value);
    async move {
        op.await;
        resume_with()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::park::ParkingRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    struct CountWaker(AtomicUsize);

    impl Wake for CountWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn counting_waker() -> (Arc<CountWaker>, Waker) {
        let count = Arc::new(CountWaker(AtomicUsize::new(0)));
        (count.clone(), Waker::from(count))
    }

    fn chan<T>(capacity: Option<usize>) -> (Chan<T>, SharedRegistry) {
        let registry: SharedRegistry = Rc::new(RefCell::new(ParkingRegistry::new()));
        (Chan::new(ChanId(1), capacity, registry.clone()), registry)
    }

    #[test]
    fn poll_empty_is_none() {
        let (c, _) = chan::<i32>(Some(1));
        assert_eq!(poll(&c), None);
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn offer_respects_capacity() {
        let (c, _) = chan(Some(2));
        c.offer(1).unwrap();
        c.offer(2).unwrap();
        assert!(c.is_full());
        let rejected = c.offer(3).unwrap_err();
        assert_eq!(rejected.into_inner(), 3);
        assert_eq!(c.poll(), Some(1));
        assert_eq!(c.poll(), Some(2));
        assert_eq!(c.poll(), None);
    }

    #[test]
    fn unbounded_never_full() {
        let (c, _) = chan(None);
        for i in 0..1000 {
            c.offer(i).unwrap();
        }
        assert!(!c.is_full());
        assert_eq!(c.len(), 1000);
        assert_eq!(c.capacity(), None);
    }

    #[test]
    fn take_parks_then_wakes_on_offer() {
        let (c, registry) = chan::<&str>(Some(1));
        let (count, waker) = counting_waker();
        let mut cx = Context::from_waker(&waker);

        let mut op = c.take();
        assert!(Pin::new(&mut op).poll(&mut cx).is_pending());
        assert_eq!(c.parked_takers(), 1);

        // Polling again before anyone offers does not re-register.
        assert!(Pin::new(&mut op).poll(&mut cx).is_pending());
        assert_eq!(registry.borrow().total(), 1);

        c.offer("hi").unwrap();
        assert_eq!(count.0.load(Ordering::Relaxed), 1);
        assert_eq!(c.parked_takers(), 0);
        assert_eq!(Pin::new(&mut op).poll(&mut cx), Poll::Ready("hi"));
    }

    #[test]
    fn put_parks_when_full() {
        let (c, _) = chan(Some(1));
        let (count, waker) = counting_waker();
        let mut cx = Context::from_waker(&waker);

        c.offer(1).unwrap();
        let mut op = c.put(2);
        assert!(Pin::new(&mut op).poll(&mut cx).is_pending());
        assert_eq!(c.parked_putters(), 1);
        assert_eq!(c.len(), 1);

        assert_eq!(c.poll(), Some(1));
        assert_eq!(count.0.load(Ordering::Relaxed), 1);
        assert!(Pin::new(&mut op).poll(&mut cx).is_ready());
        assert_eq!(c.poll(), Some(2));
    }

    #[test]
    fn dropped_take_deregisters() {
        let (c, registry) = chan::<i32>(Some(1));
        let (_count, waker) = counting_waker();
        let mut cx = Context::from_waker(&waker);

        let mut op = c.take();
        assert!(Pin::new(&mut op).poll(&mut cx).is_pending());
        drop(op);
        assert_eq!(registry.borrow().total(), 0);
    }

    #[test]
    fn woken_then_dropped_take_passes_wakeup_on() {
        let (c, _) = chan::<i32>(Some(1));
        let (first, w1) = counting_waker();
        let (second, w2) = counting_waker();

        let mut a = c.take();
        let mut b = c.take();
        assert!(Pin::new(&mut a).poll(&mut Context::from_waker(&w1)).is_pending());
        assert!(Pin::new(&mut b).poll(&mut Context::from_waker(&w2)).is_pending());

        c.offer(5).unwrap();
        assert_eq!(first.0.load(Ordering::Relaxed), 1);
        assert_eq!(second.0.load(Ordering::Relaxed), 0);

        drop(a);
        assert_eq!(second.0.load(Ordering::Relaxed), 1);
        assert_eq!(Pin::new(&mut b).poll(&mut Context::from_waker(&w2)), Poll::Ready(5));
    }

    #[test]
    fn robbed_take_reparks_at_the_back() {
        let (c, _) = chan::<i32>(Some(1));
        let (first, w1) = counting_waker();
        let (second, w2) = counting_waker();

        let mut a = c.take();
        let mut b = c.take();
        assert!(Pin::new(&mut a).poll(&mut Context::from_waker(&w1)).is_pending());
        assert!(Pin::new(&mut b).poll(&mut Context::from_waker(&w2)).is_pending());

        c.offer(5).unwrap();
        assert_eq!(first.0.load(Ordering::Relaxed), 1);
        // Someone else takes the value before `a` runs.
        assert_eq!(c.poll(), Some(5));
        assert!(Pin::new(&mut a).poll(&mut Context::from_waker(&w1)).is_pending());
        assert_eq!(c.parked_takers(), 2);

        c.offer(6).unwrap();
        assert_eq!(second.0.load(Ordering::Relaxed), 1);
        assert_eq!(first.0.load(Ordering::Relaxed), 1);
        assert_eq!(Pin::new(&mut b).poll(&mut Context::from_waker(&w2)), Poll::Ready(6));
    }

    #[test]
    fn clones_share_buffer() {
        let (c, _) = chan(Some(3));
        let other = c.clone();
        c.offer('x').unwrap();
        assert_eq!(other.poll(), Some('x'));
        assert_eq!(c, other);
    }
}
