// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Integration tests for the `gotick` demo commands.
//! Each test runs the built binary and checks its stdout.

use std::process::{Command, Output};

fn gotick(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gotick"))
        .args(args)
        .env("NO_COLOR", "1")
        .env("GOTICK_TICK_INTERVAL_MS", "0")
        .env_remove("GOTICK_STOP_WHEN_IDLE")
        .output()
        .expect("failed to run gotick")
}

/// Lines printed by the logical thread named `actor`.
fn actor_lines(out: &str, actor: &str) -> usize {
    let prefix = format!("{} ", actor);
    out.lines()
        .filter(|l| l.trim_start().starts_with(&prefix))
        .count()
}

fn stdout_of(args: &[&str]) -> String {
    let out = gotick(args);
    assert!(
        out.status.success(),
        "gotick {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr),
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn countdown_reaches_liftoff() {
    let out = stdout_of(&["countdown", "3"]);
    assert!(out.contains("countdown OK"), "{}", out);
    assert!(out.contains("liftoff"));
    assert_eq!(actor_lines(&out, "countdown"), 4, "{}", out);
}

#[test]
fn pipeline_sums_squares() {
    let out = stdout_of(&["pipeline", "4"]);
    assert!(out.contains("sum of squares 1..=4 = 30"), "{}", out);
}

#[test]
fn pingpong_plays_all_rounds() {
    let out = stdout_of(&["pingpong", "3"]);
    assert!(out.contains("3 rounds played"), "{}", out);
    assert_eq!(actor_lines(&out, "pong"), 3, "{}", out);
    assert_eq!(actor_lines(&out, "ping"), 3, "{}", out);
}

#[test]
fn unknown_command_fails() {
    let out = gotick(&["juggle"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown command"));
}

#[test]
fn bad_config_is_reported() {
    let out = Command::new(env!("CARGO_BIN_EXE_gotick"))
        .args(["countdown"])
        .env("NO_COLOR", "1")
        .env("GOTICK_TICK_INTERVAL_MS", "soon")
        .output()
        .expect("failed to run gotick");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("GOTICK_TICK_INTERVAL_MS"));
}
