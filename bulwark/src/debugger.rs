// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Breaking into an attached debugger when an assertion fails.

use nix::sys::signal::{Signal, raise};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

static BREAK_ON_FAILURE: AtomicBool = AtomicBool::new(false);

pub(crate) fn set_break_on_failure(enabled: bool) {
    BREAK_ON_FAILURE.store(enabled, Ordering::SeqCst);
}

/// Raises `SIGTRAP` if breaking on failure is enabled and a debugger is
/// attached. Otherwise does nothing.
pub(crate) fn break_if_requested() {
    if !BREAK_ON_FAILURE.load(Ordering::SeqCst) || !is_debugger_attached() {
        return;
    }
    debug!("assertion failed under a debugger, raising SIGTRAP");
    // With a debugger attached, SIGTRAP stops the process before the trap
    // sees it. Without one this code isn't reached.
    if let Err(errno) = raise(Signal::SIGTRAP) {
        debug!("failed to raise SIGTRAP: {errno}");
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn is_debugger_attached() -> bool {
    match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => tracer_pid(&status).is_some_and(|pid| pid != 0),
        Err(_) => false,
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn is_debugger_attached() -> bool {
    false
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|pid| pid.trim().parse().ok())
}
