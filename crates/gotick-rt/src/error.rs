// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime error types.

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Why a job ended without producing its value.
///
/// Delivered as `Err(..)` on the job's future channel so that whoever
/// takes from it observes the failure instead of waiting forever.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The job panicked while being polled.
    #[error("job panicked: {message}")]
    Panicked { message: String },
    /// The scheduler was shut down before the job finished.
    #[error("job abandoned at scheduler shutdown")]
    Abandoned,
}

impl Fault {
    /// Build a `Panicked` fault from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Fault::Panicked { message }
    }
}

/// Result of a logical thread: its value, or the fault that ended it.
pub type Outcome<T> = Result<T, Fault>;

/// Errors reported by the scheduler itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No runnable job is left, but the awaited channel is still empty.
    #[error("scheduler stalled: no runnable jobs, {parked} parked")]
    Stalled { parked: usize },
    /// `block_on` was called from inside a running job.
    #[error("block_on called from inside a tick")]
    Reentrant,
}

/// Invalid scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Returned by `Chan::offer` when a bounded channel has no room.
/// Hands the rejected value back.
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Recover the value that could not be buffered.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel is full")
    }
}

impl<T> std::error::Error for Full<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_str() {
        let fault = Fault::from_panic(Box::new("boom"));
        assert_eq!(
            fault,
            Fault::Panicked {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn panic_payload_string() {
        let fault = Fault::from_panic(Box::new(format!("bad {}", 7)));
        assert_eq!(fault.to_string(), "job panicked: bad 7");
    }

    #[test]
    fn panic_payload_other() {
        let fault = Fault::from_panic(Box::new(42u8));
        assert!(matches!(fault, Fault::Panicked { message } if message == "unknown panic"));
    }

    #[test]
    fn full_returns_value() {
        let err = Full(vec![1, 2]);
        assert_eq!(err.to_string(), "channel is full");
        assert_eq!(err.into_inner(), vec![1, 2]);
    }
}
