// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Stop signal for the tick driver.
//!
//! AtomicBool flag. `Scheduler::run` checks it before every tick, so an
//! owning thread or test harness can end the driver from outside.

use std::sync::atomic::{AtomicBool, Ordering};

/// Stop flag shared between the tick driver and whoever owns it.
#[derive(Debug)]
pub struct StopToken {
    flag: AtomicBool,
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Ask the driver to stop after the current tick.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear the flag so the driver can be started again.
    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
