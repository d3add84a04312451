// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The set of signals the trap intercepts.

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fatal signal that the [trap](crate::trap) intercepts.
///
/// Only these signals can be passed to
/// [`TestContext::expect_signal`](crate::context::TestContext::expect_signal).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
pub enum TrapSignal {
    /// Invalid memory reference.
    #[serde(rename = "SIGSEGV")]
    Segv,
    /// Bus error (misaligned or unmapped access on some platforms).
    #[serde(rename = "SIGBUS")]
    Bus,
    /// Illegal instruction.
    #[serde(rename = "SIGILL")]
    Ill,
    /// Floating-point exception.
    #[serde(rename = "SIGFPE")]
    Fpe,
    /// Abort, as raised by `std::process::abort`.
    #[serde(rename = "SIGABRT")]
    Abrt,
    /// Termination request.
    #[serde(rename = "SIGTERM")]
    Term,
    /// Timer expiry. Also used to enforce timeouts.
    #[serde(rename = "SIGALRM")]
    Alrm,
    /// Trace/breakpoint trap.
    #[serde(rename = "SIGTRAP")]
    Trap,
}

impl TrapSignal {
    /// Every signal the trap installs a handler for.
    pub const ALL: [TrapSignal; 8] = [
        TrapSignal::Segv,
        TrapSignal::Bus,
        TrapSignal::Ill,
        TrapSignal::Fpe,
        TrapSignal::Abrt,
        TrapSignal::Term,
        TrapSignal::Alrm,
        TrapSignal::Trap,
    ];

    /// Returns the corresponding `nix` signal.
    pub fn to_nix(self) -> Signal {
        match self {
            TrapSignal::Segv => Signal::SIGSEGV,
            TrapSignal::Bus => Signal::SIGBUS,
            TrapSignal::Ill => Signal::SIGILL,
            TrapSignal::Fpe => Signal::SIGFPE,
            TrapSignal::Abrt => Signal::SIGABRT,
            TrapSignal::Term => Signal::SIGTERM,
            TrapSignal::Alrm => Signal::SIGALRM,
            TrapSignal::Trap => Signal::SIGTRAP,
        }
    }

    /// Returns the raw signal number on this platform.
    pub fn as_raw(self) -> i32 {
        self.to_nix() as i32
    }

    /// Looks up a trap signal by its raw signal number.
    pub fn from_raw(signo: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|sig| sig.as_raw() == signo)
    }

    /// The symbolic name, e.g. `SIGSEGV`.
    pub fn name(self) -> &'static str {
        self.to_nix().as_str()
    }

    /// Whether the kernel reports a faulting address for this signal.
    pub fn has_fault_address(self) -> bool {
        matches!(
            self,
            TrapSignal::Segv | TrapSignal::Bus | TrapSignal::Ill | TrapSignal::Fpe
        )
    }
}

impl fmt::Display for TrapSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the symbolic name for any signal number, if the platform knows it.
pub(crate) fn signal_str(signo: i32) -> Option<&'static str> {
    Signal::try_from(signo).ok().map(Signal::as_str)
}

/// Displays a raw signal number as `SIGKILL`, or `signal 42` if unknown.
pub(crate) fn display_signal(signo: i32) -> String {
    match signal_str(signo) {
        Some(name) => name.to_owned(),
        None => format!("signal {signo}"),
    }
}
