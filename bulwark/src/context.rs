// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-invocation context handed to test bodies.

use crate::{
    assert::{raise_failure, raise_skip},
    checkpoint::{self, Resumption},
    classify::{self, ErrorHandle, Reraised, TranslationHandler},
    outcome::Outcome,
    sandbox,
    signal::{TrapSignal, display_signal},
    trap,
};
use std::{
    any::{self, Any},
    panic::{self, AssertUnwindSafe, Location},
    time::Duration,
};

/// What a test body knows about the invocation it is running in.
pub struct TestContext<'a> {
    name: &'a str,
    repetition: u32,
    handlers: &'a [TranslationHandler],
}

impl<'a> TestContext<'a> {
    pub(crate) fn new(name: &'a str, repetition: u32, handlers: &'a [TranslationHandler]) -> Self {
        Self {
            name,
            repetition,
            handlers,
        }
    }

    /// The name of the running test.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The zero-based repetition of the body in this run.
    pub fn repetition(&self) -> u32 {
        self.repetition
    }

    /// Arms the timeout for the rest of this invocation, replacing any
    /// configured default. `Duration::ZERO` disarms it.
    ///
    /// When the timeout expires the test fails with
    /// `Timed out after <duration> (SIGALRM)!`.
    #[track_caller]
    pub fn set_timeout(&self, timeout: Duration) {
        if let Err(error) = trap::set_timeout(timeout) {
            raise_failure(format!(
                "Could not arm timeout: {error}, on line {}!",
                Location::caller().line()
            ));
        }
    }

    /// Runs `block` and requires it to raise `signal`.
    ///
    /// If the block raises `signal`, the test carries on after this call. If
    /// it raises a different signal, or returns normally, the test fails.
    /// Failures, skips and errors raised inside the block end the test as if
    /// raised here.
    ///
    /// The block runs behind a nested [checkpoint](crate::checkpoint), so
    /// its memory effects are not visible once this call returns. The
    /// enclosing invocation's timeout keeps running while the block does.
    #[track_caller]
    pub fn expect_signal<F: FnOnce()>(&self, signal: TrapSignal, block: F) {
        let line = Location::caller().line();
        let handlers = self.handlers;

        let resumption = checkpoint::establish(|| {
            trap::forget_timeout();
            trap::expect(Some(signal));
            let result = panic::catch_unwind(AssertUnwindSafe(block));
            trap::expect(None);
            result.err().map(|payload| {
                classify::classify(&*payload, handlers, sandbox::take_panic_location().as_deref())
            })
        });

        match resumption {
            Ok(Resumption::Fired(report)) if report.signal == signal => {}
            // Without an installed trap the block dies of the signal itself.
            Ok(Resumption::Killed { signal: raw }) if raw == signal.as_raw() => {}
            Ok(Resumption::Fired(report)) => raise_failure(format!(
                "Expected signal {signal}, but received {}, on line {line}!",
                report.signal
            )),
            Ok(Resumption::Completed(None)) => {
                raise_failure(format!("Expected signal {signal}, on line {line}!"))
            }
            Ok(Resumption::Completed(Some(outcome))) => reraise(outcome),
            Ok(Resumption::Killed { signal: raw }) => raise_failure(format!(
                "Expected signal {signal}, but the block was killed by {}, on line {line}!",
                display_signal(raw)
            )),
            Ok(Resumption::Exited { code }) => raise_failure(format!(
                "Expected signal {signal}, but the block exited with code {code}, on line {line}!"
            )),
            Err(error) => raise_failure(format!(
                "Could not run block expecting {signal}: {error}, on line {line}!"
            )),
        }
    }

    /// Runs `block` and requires it to panic.
    #[track_caller]
    pub fn expect_panic<F: FnOnce()>(&self, block: F) {
        let line = Location::caller().line();
        match panic::catch_unwind(AssertUnwindSafe(block)) {
            Ok(()) => raise_failure(format!("Expected panic, on line {line}!")),
            Err(payload) if classify::is_intrinsic(&*payload) => panic::resume_unwind(payload),
            Err(_) => {
                sandbox::take_panic_location();
            }
        }
    }

    /// Runs `block` and requires it to panic with a payload of type `T`.
    ///
    /// The payload is matched the way translation handlers see it, so `T`
    /// can be the value passed to `std::panic::panic_any`, `&str`, or
    /// `String`.
    #[track_caller]
    pub fn expect_panic_of<T: Any, F: FnOnce()>(&self, block: F) {
        let line = Location::caller().line();
        match panic::catch_unwind(AssertUnwindSafe(block)) {
            Ok(()) => raise_failure(format!("Expected panic, on line {line}!")),
            Err(payload) if classify::is_intrinsic(&*payload) => panic::resume_unwind(payload),
            Err(payload) => {
                sandbox::take_panic_location();
                if ErrorHandle::new(&*payload).downcast_ref::<T>().is_none() {
                    raise_failure(format!(
                        "Expected panic of type {}, on line {line}!",
                        any::type_name::<T>()
                    ));
                }
            }
        }
    }

    /// Skips the rest of the test with `reason`.
    pub fn skip(&self, reason: impl Into<String>) -> ! {
        raise_skip(reason.into())
    }
}

fn reraise(outcome: Outcome) -> ! {
    panic::resume_unwind(Box::new(Reraised(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{SkipRequest, TestFailure};
    use pretty_assertions::assert_eq;

    fn reason_of(f: impl FnOnce()) -> String {
        let payload =
            panic::catch_unwind(AssertUnwindSafe(f)).expect_err("body should raise a failure");
        payload
            .downcast_ref::<TestFailure>()
            .expect("payload is a TestFailure")
            .reason()
            .to_owned()
    }

    #[test]
    fn accessors() {
        let cx = TestContext::new("widget", 3, &[]);
        assert_eq!(cx.name(), "widget");
        assert_eq!(cx.repetition(), 3);
    }

    #[test]
    fn expect_panic_accepts_panics() {
        let cx = TestContext::new("t", 0, &[]);
        cx.expect_panic(|| panic!("boom"));
        cx.expect_panic_of::<&str, _>(|| panic!("boom"));
        cx.expect_panic_of::<String, _>(|| panic!("boom {}", 1));
        cx.expect_panic_of::<u16, _>(|| panic::panic_any(7u16));
    }

    #[test]
    fn expect_panic_without_panic_fails() {
        let cx = TestContext::new("t", 0, &[]);
        let line = line!() + 1;
        let reason = reason_of(|| cx.expect_panic(|| {}));
        assert_eq!(reason, format!("Expected panic, on line {line}!"));
    }

    #[test]
    fn expect_panic_of_wrong_type_fails() {
        let cx = TestContext::new("t", 0, &[]);
        let line = line!() + 1;
        let reason = reason_of(|| cx.expect_panic_of::<u16, _>(|| panic!("boom")));
        assert_eq!(
            reason,
            format!("Expected panic of type u16, on line {line}!")
        );
    }

    #[test]
    fn expect_panic_passes_failures_and_skips_through() {
        let cx = TestContext::new("t", 0, &[]);
        let reason = reason_of(|| cx.expect_panic(|| raise_failure("inner".to_owned())));
        assert_eq!(reason, "inner");

        let payload = panic::catch_unwind(AssertUnwindSafe(|| {
            cx.expect_panic(|| cx.skip("not here"));
        }))
        .expect_err("skip propagates");
        assert_eq!(
            payload.downcast_ref::<SkipRequest>(),
            Some(&SkipRequest::new("not here"))
        );
    }
}
