// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The classified result of one test.

use crate::signal::{TrapSignal, display_signal};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The result of running one test unit.
///
/// Exactly one outcome is produced per test unit, including units abandoned
/// partway through because of a fatal signal.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum Outcome {
    /// Every repetition of the body ran to completion.
    Success,
    /// The test failed.
    Failure(TestFailure),
    /// The body asked to be skipped.
    Skipped(String),
    /// The body raised an error that no translation handler recognized.
    UnrecognizedError(String),
}

impl Outcome {
    /// Returns true for outcomes that count toward the failure total.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_) | Outcome::UnrecognizedError(_))
    }

    /// The status word printed on the result line.
    pub fn status_str(&self) -> &'static str {
        match self {
            Outcome::Success => "successful",
            Outcome::Failure(_) | Outcome::UnrecognizedError(_) => "failed",
            Outcome::Skipped(_) => "skipped",
        }
    }
}

/// A normalized test failure: a reason and what caused it.
///
/// Raising a `TestFailure` with [`std::panic::panic_any`] (which is what the
/// [`fail!`](crate::fail) family of macros does) fails the current test with
/// exactly this reason.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct TestFailure {
    reason: String,
    kind: FailureKind,
}

impl TestFailure {
    /// Creates an assertion failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self::with_kind(reason, FailureKind::Assertion)
    }

    pub(crate) fn with_kind(reason: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            reason: reason.into(),
            kind,
        }
    }

    /// A failure synthesized for a fatal signal.
    pub(crate) fn signal(signal: TrapSignal, address: Option<u64>) -> Self {
        let reason = match address {
            Some(address) => format!("Received {signal} while trying to access: {address:#x}!"),
            None => format!("Received {signal}!"),
        };
        Self::with_kind(reason, FailureKind::Signal { signal, address })
    }

    /// A failure synthesized for an expired timeout.
    pub(crate) fn timeout(after: Duration) -> Self {
        Self::with_kind(
            format!(
                "Timed out after {} ({})!",
                humantime::format_duration(after),
                TrapSignal::Alrm
            ),
            FailureKind::Timeout { after },
        )
    }

    /// A failure for a test process that exited without reporting a result.
    pub(crate) fn exited(code: i32) -> Self {
        Self::with_kind(
            format!("Test process exited with code {code} before reporting a result!"),
            FailureKind::Exited { code },
        )
    }

    /// A failure for a test process killed by a signal the trap doesn't handle.
    pub(crate) fn killed(signal: i32) -> Self {
        Self::with_kind(
            format!("Test process was killed by {}!", display_signal(signal)),
            FailureKind::Killed { signal },
        )
    }

    /// The reason string, as printed after `Error:`.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// What caused the failure.
    pub fn kind(&self) -> &FailureKind {
        &self.kind
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// What caused a [`TestFailure`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum FailureKind {
    /// An assertion or an explicit `fail!`.
    Assertion,
    /// A fatal signal intercepted by the trap.
    Signal {
        /// The signal that was delivered.
        signal: TrapSignal,
        /// The faulting address, for memory and instruction faults.
        address: Option<u64>,
    },
    /// The armed timeout expired.
    Timeout {
        /// The timeout that was armed.
        after: Duration,
    },
    /// The test process exited on its own, for example via
    /// `std::process::exit`.
    Exited {
        /// The exit code.
        code: i32,
    },
    /// The test process was killed by a signal outside the trapped set.
    Killed {
        /// The raw signal number.
        signal: i32,
    },
}

/// A request to skip the current test, raised by [`skip!`](crate::skip).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkipRequest {
    pub(crate) reason: String,
}

impl SkipRequest {
    /// Creates a new skip request.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
