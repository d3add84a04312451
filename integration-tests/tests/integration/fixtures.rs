// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use integration_tests::suite_cli::{SuiteCli, SuiteOutput};
use nix::{errno::Errno, sys::signal, unistd::Pid};
use pretty_assertions::assert_eq;
use regex::Regex;
use std::{
    sync::LazyLock,
    thread,
    time::{Duration, Instant},
};

pub fn demo_suite() -> SuiteCli {
    SuiteCli::new(env!("CARGO_BIN_EXE_demo-suite"))
}

pub fn clean_suite() -> SuiteCli {
    SuiteCli::new(env!("CARGO_BIN_EXE_clean-suite"))
}

pub fn signal_suite() -> SuiteCli {
    SuiteCli::new(env!("CARGO_BIN_EXE_signal-suite"))
}

pub fn control_suite() -> SuiteCli {
    SuiteCli::new(env!("CARGO_BIN_EXE_control-suite"))
}

pub fn handler_suite() -> SuiteCli {
    SuiteCli::new(env!("CARGO_BIN_EXE_handler-suite"))
}

static LINE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r", on line \d+!").expect("valid regex"));
static PANIC_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \(at [^()]+\.rs:\d+:\d+\)$").expect("valid regex"));
static FAULT_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"access: 0x[0-9a-f]{5,}!$").expect("valid regex"));
static RUN_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \(time: \d+\.\d{3}ms\)$").expect("valid regex"));

/// Replaces the parts of a result line that move when the suites are edited.
pub fn normalize(line: &str) -> String {
    let line = LINE_NUMBER.replace_all(line, ", on line N!");
    let line = FAULT_ADDRESS.replace(&line, "access: ADDR!");
    PANIC_LOCATION.replace(&line, " (at LOCATION)").into_owned()
}

pub fn has_run_time(summary: &str) -> bool {
    RUN_TIME.is_match(summary)
}

#[track_caller]
pub fn check_results(output: &SuiteOutput, expected: &[&str]) {
    let actual: Vec<_> = output.result_lines().iter().map(|l| normalize(l)).collect();
    assert_eq!(actual, expected, "result lines for:\n{output}");
}

#[track_caller]
pub fn check_summary(output: &SuiteOutput, expected: &str) {
    assert_eq!(
        output.summary_line().as_deref(),
        Some(expected),
        "summary for:\n{output}"
    );
}

#[track_caller]
pub fn check_exit_code(output: &SuiteOutput, expected: i32) {
    assert_eq!(
        output.exit_status.code(),
        Some(expected),
        "exit code for:\n{output}"
    );
}

/// Polls until `pid` has exited, returning false if it is still running
/// after `timeout`. Zombies count as exited.
pub fn wait_until_gone(pid: i32, timeout: Duration) -> bool {
    let start = Instant::now();
    while is_running(pid) {
        if start.elapsed() > timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
    true
}

fn is_running(pid: i32) -> bool {
    match signal::kill(Pid::from_raw(pid), None) {
        Err(Errno::ESRCH) => false,
        _ => !is_zombie(pid),
    }
}

fn is_zombie(pid: i32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        // Without procfs, a process that can still be signalled is running.
        return false;
    };
    // The state follows the parenthesized command name, which may contain spaces.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state == 'Z')
}
