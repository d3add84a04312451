// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests that raise signals, expected and otherwise, or leave the process in
//! other abrupt ways.

use bulwark::{
    check, check_eq, errors::TrapError, fail, registry::Registry, signal::TrapSignal, trap,
};
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

/// If set, `nested_timeout` writes the pid of its innermost process here.
const PID_FILE_ENV: &str = "SIGNAL_SUITE_PID_FILE";

static TOUCHED: AtomicUsize = AtomicUsize::new(0);

fn segfault() {
    // SAFETY: nothing is mapped at this address; the write faults.
    unsafe { std::ptr::write_volatile(std::ptr::without_provenance_mut::<i32>(0x8), 42) };
}

fn raise(signal: Signal) {
    if let Err(errno) = signal::raise(signal) {
        fail!("raise({signal}) failed: {errno}");
    }
}

fn sleep_forever() -> ! {
    loop {
        thread::sleep(Duration::from_millis(10));
    }
}

fn record_pid() {
    if let Some(path) = std::env::var_os(PID_FILE_ENV)
        && let Err(error) = std::fs::write(&path, std::process::id().to_string())
    {
        fail!("writing pid file failed: {error}");
    }
}

#[allow(unconditional_recursion)]
fn recurse(depth: u64) -> u64 {
    let frame = std::hint::black_box([depth; 64]);
    recurse(frame[0] + 1) + frame[1]
}

fn main() {
    let mut registry = Registry::new();

    registry
        .test("expected_segv", |cx| {
            cx.expect_signal(TrapSignal::Segv, segfault);
        })
        .test("expected_abort", |cx| {
            cx.expect_signal(TrapSignal::Abrt, || std::process::abort());
        })
        .test("expected_fpe", |cx| {
            cx.expect_signal(TrapSignal::Fpe, || raise(Signal::SIGFPE));
        })
        .test("expected_term", |cx| {
            cx.expect_signal(TrapSignal::Term, || raise(Signal::SIGTERM));
        })
        .test("expected_trap", |cx| {
            cx.expect_signal(TrapSignal::Trap, || raise(Signal::SIGTRAP));
        })
        .test("expected_bus", |cx| {
            cx.expect_signal(TrapSignal::Bus, || raise(Signal::SIGBUS));
        })
        .test("expected_alarm", |cx| {
            cx.expect_signal(TrapSignal::Alrm, || {
                cx.set_timeout(Duration::from_millis(50));
                sleep_forever()
            });
        })
        .test("wrong_signal", |cx| {
            cx.expect_signal(TrapSignal::Segv, || raise(Signal::SIGFPE));
        })
        .test("no_signal", |cx| {
            cx.expect_signal(TrapSignal::Fpe, || {});
        })
        .test("fails_inside_block", |cx| {
            cx.expect_signal(TrapSignal::Segv, || fail!("gave up before faulting"));
        })
        .test("fails_after_expected_signal", |cx| {
            cx.expect_signal(TrapSignal::Segv, segfault);
            check_eq!(1i32 + 1, 3i32);
        })
        .test("block_state_is_discarded", |cx| {
            cx.expect_signal(TrapSignal::Segv, || {
                TOUCHED.fetch_add(1, Ordering::SeqCst);
                segfault();
            });
            check_eq!(TOUCHED.load(Ordering::SeqCst), 0usize);
        })
        .test("timeout_in_expect_block", |cx| {
            cx.set_timeout(Duration::from_millis(200));
            cx.expect_signal(TrapSignal::Segv, || sleep_forever());
        })
        .test("nested_timeout", |cx| {
            cx.set_timeout(Duration::from_millis(200));
            cx.expect_signal(TrapSignal::Abrt, || {
                cx.expect_signal(TrapSignal::Segv, || {
                    record_pid();
                    sleep_forever()
                })
            });
        })
        .test("raised_fpe", |_| raise(Signal::SIGFPE))
        .test("raised_ill", |_| raise(Signal::SIGILL))
        .test("raised_bus", |_| raise(Signal::SIGBUS))
        .test("raised_term", |_| raise(Signal::SIGTERM))
        .test("raised_trap", |_| raise(Signal::SIGTRAP))
        .test("stack_overflow", |_| {
            std::hint::black_box(recurse(0));
        })
        .test("abort", |_| std::process::abort())
        .test("exit", |_| std::process::exit(3))
        .test("killed", |_| {
            if let Err(errno) = signal::kill(Pid::this(), Signal::SIGKILL) {
                fail!("kill failed: {errno}");
            }
        })
        .test("install_twice", |_| {
            check!(trap::is_installed());
            check!(matches!(trap::install(), Err(TrapError::AlreadyInstalled)));
        })
        .test("timer_state", |cx| {
            check_eq!(trap::armed_timeout(), None::<Duration>);
            cx.set_timeout(Duration::from_secs(30));
            check_eq!(trap::armed_timeout(), Some(Duration::from_secs(30)));
            cx.set_timeout(Duration::ZERO);
            check_eq!(trap::armed_timeout(), None::<Duration>);
        })
        .test("survivor", |_| {});

    bulwark::run_main(registry);
}
