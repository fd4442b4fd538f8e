// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! gotick runtime: goroutine-style concurrency on one thread.
//!
//! Logical threads are futures polled by a cooperative scheduler, one job
//! per tick. They talk over bounded or unbounded channels; a take from an
//! empty channel or a put to a full one parks the job until the
//! counterpart operation wakes it. Parked jobs cost nothing per tick.
//!
//! Components:
//! - channel: `Chan`, `poll`/`take`/`put`
//! - park: per-channel FIFO parking registry
//! - scheduler: job queue, tick, driver, shutdown
//! - spawn: go/gocall/gotake/goput, yield_now
//! - looping: goloop/goconsume, tail calls via `Step`
//!
//! ```
//! use gotick_rt::Scheduler;
//!
//! let sched = Scheduler::new();
//! let c = sched.chan(1);
//! let doubled = sched.gotake(&c, |v: i32| v * 2);
//! sched.goput(&c, 21);
//! assert_eq!(sched.block_on(&doubled), Ok(Ok(42)));
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod looping;
pub mod park;
mod queue;
pub mod scheduler;
pub mod spawn;
pub mod stop;
pub mod task;

pub use channel::{poll, put, take, Chan, Put, Take};
pub use config::SchedulerConfig;
pub use error::{ConfigError, Fault, Full, Outcome, RuntimeError};
pub use looping::{Recur, Step};
pub use park::ChanId;
pub use scheduler::{Scheduler, SchedulerStats, TickOutcome, WeakScheduler};
pub use spawn::{yield_now, YieldNow};
pub use stop::StopToken;
pub use task::{TaskId, TaskState};
