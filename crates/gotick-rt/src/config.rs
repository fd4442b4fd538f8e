// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable overriding `tick_interval`, in milliseconds.
pub const TICK_INTERVAL_ENV: &str = "GOTICK_TICK_INTERVAL_MS";
/// Environment variable overriding `stop_when_idle` (`1`/`true`/`0`/`false`).
pub const STOP_WHEN_IDLE_ENV: &str = "GOTICK_STOP_WHEN_IDLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause between two ticks of `Scheduler::run`. Zero runs ticks back to back.
    pub tick_interval: Duration,
    /// Make `Scheduler::run` return once the job queue is empty.
    pub stop_when_idle: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1),
            stop_when_idle: false,
        }
    }
}

impl SchedulerConfig {
    /// Defaults, overridden by `GOTICK_TICK_INTERVAL_MS` and
    /// `GOTICK_STOP_WHEN_IDLE` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TICK_INTERVAL_ENV) {
            let ms: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    var: TICK_INTERVAL_ENV,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.tick_interval = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(STOP_WHEN_IDLE_ENV) {
            config.stop_when_idle = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: STOP_WHEN_IDLE_ENV,
                        value: raw,
                        reason: "expected a boolean".to_string(),
                    })
                }
            };
        }

        Ok(config)
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_stop_when_idle(mut self, stop: bool) -> Self {
        self.stop_when_idle = stop;
        self
    }
}
