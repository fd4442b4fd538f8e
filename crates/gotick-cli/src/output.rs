// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.
//! Colors are automatically disabled when output is piped.

use std::time::Duration;

use colored::{ColoredString, Colorize};
use gotick_rt::SchedulerStats;

/// Initialize color support based on environment.
/// Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

// === Errors ===

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

// === Demo Output ===

pub fn banner_start(demo: &str, interval: Duration) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} (tick every {:?})", demo, interval).bold(),
        "===".dimmed()
    )
}

pub fn banner_ok(demo: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} OK", demo).green().bold(),
        "===".dimmed()
    )
}

/// Name of the logical thread printing a line.
pub fn actor(name: &str) -> ColoredString {
    format!("{:>9}", name).cyan()
}

pub fn stats_line(ticks: u64, stats: &SchedulerStats) -> ColoredString {
    format!(
        "{} ticks ({} idle), {} polls, {} jobs, {} parks, {} unparks",
        ticks, stats.idle_ticks, stats.polls, stats.spawned, stats.parks, stats.unparks
    )
    .dimmed()
}

// === Help Output ===

pub fn title(name: &str) -> ColoredString {
    name.bold()
}

pub fn version(v: &str) -> ColoredString {
    v.dimmed()
}

pub fn section_header(header: &str) -> ColoredString {
    header.yellow().bold()
}

pub fn command(name: &str) -> ColoredString {
    name.green()
}

pub fn arg(name: &str) -> ColoredString {
    name.cyan()
}
