// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Parking registry.
//!
//! Channel operations that cannot complete register their waker here,
//! keyed by channel, in FIFO order per channel and per side. The
//! counterpart operation wakes the oldest entry and removes it in the
//! same step, so a parked operation is never both registered and queued.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::task::Waker;

/// Identity of a channel, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChanId(pub(crate) u64);

impl fmt::Display for ChanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan#{}", self.0)
    }
}

/// Which queue of a channel an operation waits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// Waiting for a value to arrive.
    Take,
    /// Waiting for room in the buffer.
    Put,
}

/// Handle to one registry entry, held by the parked future.
pub(crate) type Ticket = u64;

struct Parked {
    ticket: Ticket,
    waker: Waker,
}

/// Per-channel FIFO queues of parked takes and parked puts.
#[derive(Default)]
pub(crate) struct ParkingRegistry {
    takers: HashMap<ChanId, VecDeque<Parked>>,
    putters: HashMap<ChanId, VecDeque<Parked>>,
    next_ticket: Ticket,
    parks: u64,
    unparks: u64,
}

pub(crate) type SharedRegistry = Rc<RefCell<ParkingRegistry>>;

impl ParkingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn side(&self, side: Side) -> &HashMap<ChanId, VecDeque<Parked>> {
        match side {
            Side::Take => &self.takers,
            Side::Put => &self.putters,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut HashMap<ChanId, VecDeque<Parked>> {
        match side {
            Side::Take => &mut self.takers,
            Side::Put => &mut self.putters,
        }
    }

    /// Register `waker` as the newest waiter on `chan`.
    pub fn park(&mut self, side: Side, chan: ChanId, waker: Waker) -> Ticket {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.side_mut(side)
            .entry(chan)
            .or_default()
            .push_back(Parked { ticket, waker });
        self.parks += 1;
        tracing::trace!(%chan, ?side, ticket, "parked");
        ticket
    }

    /// Whether `ticket` is still waiting. Swaps in `waker` if it changed.
    pub fn still_parked(&mut self, side: Side, chan: ChanId, ticket: Ticket, waker: &Waker) -> bool {
        let Some(queue) = self.side_mut(side).get_mut(&chan) else {
            return false;
        };
        match queue.iter_mut().find(|p| p.ticket == ticket) {
            Some(parked) => {
                if !parked.waker.will_wake(waker) {
                    parked.waker = waker.clone();
                }
                true
            }
            None => false,
        }
    }

    /// Remove the oldest waiter on `chan` and return its waker.
    ///
    /// The caller wakes it after releasing the registry borrow.
    pub fn unpark(&mut self, side: Side, chan: ChanId) -> Option<Waker> {
        let map = self.side_mut(side);
        let queue = map.get_mut(&chan)?;
        let parked = queue.pop_front();
        if queue.is_empty() {
            map.remove(&chan);
        }
        let parked = parked?;
        self.unparks += 1;
        tracing::trace!(%chan, ?side, ticket = parked.ticket, "unparked");
        Some(parked.waker)
    }

    /// Drop the entry for `ticket`. Returns false if it was already unparked.
    pub fn cancel(&mut self, side: Side, chan: ChanId, ticket: Ticket) -> bool {
        let map = self.side_mut(side);
        let Some(queue) = map.get_mut(&chan) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|p| p.ticket != ticket);
        let removed = queue.len() != before;
        if queue.is_empty() {
            map.remove(&chan);
        }
        removed
    }

    /// Number of operations waiting on `chan`.
    pub fn parked(&self, side: Side, chan: ChanId) -> usize {
        self.side(side).get(&chan).map_or(0, VecDeque::len)
    }

    /// Number of operations waiting on any channel.
    pub fn total(&self) -> usize {
        self.takers.values().chain(self.putters.values()).map(VecDeque::len).sum()
    }

    /// Forget every entry without waking anyone (shutdown).
    pub fn clear(&mut self) {
        self.takers.clear();
        self.putters.clear();
    }

    pub fn parks(&self) -> u64 {
        self.parks
    }

    pub fn unparks(&self) -> u64 {
        self.unparks
    }
}

impl fmt::Debug for ParkingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = |m: &HashMap<ChanId, VecDeque<Parked>>| m.values().map(VecDeque::len).sum::<usize>();
        f.debug_struct("ParkingRegistry")
            .field("takers", &count(&self.takers))
            .field("putters", &count(&self.putters))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::task::Wake;

    struct LoggingWaker {
        id: usize,
        log: Arc<std::sync::Mutex<Vec<usize>>>,
    }

    impl Wake for LoggingWaker {
        fn wake(self: Arc<Self>) {
            self.log.lock().unwrap().push(self.id);
        }
    }

    fn waker(id: usize, log: &Arc<std::sync::Mutex<Vec<usize>>>) -> Waker {
        Waker::from(Arc::new(LoggingWaker {
            id,
            log: log.clone(),
        }))
    }

    #[test]
    fn unpark_is_fifo() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut reg = ParkingRegistry::new();
        let chan = ChanId(1);
        for id in 1..=3 {
            reg.park(Side::Take, chan, waker(id, &log));
        }
        assert_eq!(reg.parked(Side::Take, chan), 3);
        while let Some(w) = reg.unpark(Side::Take, chan) {
            w.wake();
        }
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(reg.total(), 0);
        assert_eq!(reg.parks(), 3);
        assert_eq!(reg.unparks(), 3);
    }

    #[test]
    fn sides_and_channels_are_independent() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut reg = ParkingRegistry::new();
        reg.park(Side::Take, ChanId(1), waker(1, &log));
        reg.park(Side::Put, ChanId(1), waker(2, &log));
        reg.park(Side::Take, ChanId(2), waker(3, &log));
        assert!(reg.unpark(Side::Put, ChanId(2)).is_none());
        assert_eq!(reg.parked(Side::Take, ChanId(1)), 1);
        assert_eq!(reg.parked(Side::Put, ChanId(1)), 1);
        assert_eq!(reg.total(), 3);
    }

    #[test]
    fn cancel_removes_only_that_ticket() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut reg = ParkingRegistry::new();
        let chan = ChanId(9);
        let a = reg.park(Side::Put, chan, waker(1, &log));
        let b = reg.park(Side::Put, chan, waker(2, &log));
        assert!(reg.cancel(Side::Put, chan, a));
        assert!(!reg.cancel(Side::Put, chan, a));
        let w = reg.unpark(Side::Put, chan).unwrap();
        w.wake();
        assert_eq!(*log.lock().unwrap(), vec![2]);
        assert!(!reg.cancel(Side::Put, chan, b));
    }

    #[test]
    fn still_parked_tracks_unpark() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut reg = ParkingRegistry::new();
        let chan = ChanId(4);
        let w = waker(1, &log);
        let ticket = reg.park(Side::Take, chan, w.clone());
        assert!(reg.still_parked(Side::Take, chan, ticket, &w));
        reg.unpark(Side::Take, chan);
        assert!(!reg.still_parked(Side::Take, chan, ticket, &w));
    }
}
