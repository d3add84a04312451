// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The process-wide signal trap.
//!
//! The trap intercepts every [`TrapSignal`] on a dedicated alternate stack. The
//! handler cannot carry parameters, so everything it needs lives in atomics:
//! the index of the running test, the armed timeout, the expected-signal slot,
//! the report channel of the innermost [checkpoint](crate::checkpoint) and the
//! pid of a nested checkpoint process, if any.
//!
//! On delivery the handler writes a fixed-size [`TrapReport`] record to the
//! report channel and fires the checkpoint by terminating the checkpoint
//! process. Only async-signal-safe operations are performed inside it.

use crate::{errors::TrapError, outcome::TestFailure, signal::TrapSignal};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet};
use std::{
    io,
    os::fd::RawFd,
    ptr,
    sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};
use tracing::debug;

/// Lower bound for the alternate signal stack.
const MIN_ALT_STACK_SIZE: usize = 64 * 1024;

/// Exit code of a checkpoint process whose trap fired.
pub(crate) const FIRED_EXIT_CODE: i32 = 0x62;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static CURRENT_TEST: AtomicUsize = AtomicUsize::new(0);
static REPORT_FD: AtomicI32 = AtomicI32::new(-1);
// 0 means "no signal expected": no valid signal has number 0.
static EXPECTED: AtomicI32 = AtomicI32::new(0);
// 0 means "no timeout armed".
static TIMEOUT_MICROS: AtomicU64 = AtomicU64::new(0);
static NESTED_PID: AtomicI32 = AtomicI32::new(0);

/// Installs the trap for every [`TrapSignal`] in this process.
///
/// Handlers are installed with `SA_SIGINFO | SA_ONSTACK | SA_RESETHAND`, so a
/// second delivery of the same signal (for example a fault inside the handler
/// itself) takes the default action instead of looping.
///
/// # Errors
///
/// Returns [`TrapError::AlreadyInstalled`] if called more than once in the
/// same process, or an error if a system call fails.
pub fn install() -> Result<(), TrapError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Err(TrapError::AlreadyInstalled);
    }

    let result = install_inner();
    if result.is_err() {
        INSTALLED.store(false, Ordering::SeqCst);
    }
    result
}

fn install_inner() -> Result<(), TrapError> {
    install_alt_stack().map_err(TrapError::AltStack)?;

    let action = SigAction::new(
        SigHandler::SigAction(on_trap),
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK | SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    let mut set = SigSet::empty();
    for signal in TrapSignal::ALL {
        // SAFETY: on_trap only performs async-signal-safe operations.
        unsafe { signal::sigaction(signal.to_nix(), &action) }
            .map_err(|error| TrapError::Sigaction { signal, error })?;
        set.add(signal.to_nix());
    }
    set.thread_unblock().map_err(TrapError::Unblock)?;

    debug!(
        "signal trap installed for {} signals",
        TrapSignal::ALL.len()
    );
    Ok(())
}

/// Returns true if [`install`] has succeeded in this process.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

fn install_alt_stack() -> io::Result<()> {
    let size = MIN_ALT_STACK_SIZE.max(libc::SIGSTKSZ);
    // The stack has to outlive every signal delivery, i.e. the whole process.
    let stack: &'static mut [u8] = Box::leak(vec![0u8; size].into_boxed_slice());
    let alt_stack = libc::stack_t {
        ss_sp: stack.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: size,
    };
    // SAFETY: alt_stack points at a leaked allocation of `size` bytes.
    if unsafe { libc::sigaltstack(&alt_stack, ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Arms a one-shot timer that delivers `SIGALRM` after `timeout`.
///
/// A zero duration disarms the timer. A delivery while the timer is armed is
/// reported as a timeout rather than as a plain `SIGALRM`.
///
/// # Errors
///
/// Returns [`TrapError::Timer`] if the timer could not be set.
pub fn set_timeout(timeout: Duration) -> Result<(), TrapError> {
    if timeout.is_zero() {
        set_itimer(Duration::ZERO)?;
        TIMEOUT_MICROS.store(0, Ordering::SeqCst);
        return Ok(());
    }

    // Sub-microsecond timeouts still have to arm the timer.
    let micros = u64::try_from(timeout.as_micros())
        .unwrap_or(u64::MAX)
        .max(1);
    // Publish the timeout before the timer can possibly fire.
    TIMEOUT_MICROS.store(micros, Ordering::SeqCst);
    set_itimer(Duration::from_micros(micros)).inspect_err(|_| {
        TIMEOUT_MICROS.store(0, Ordering::SeqCst);
    })
}

/// Returns the currently armed timeout, if any.
pub fn armed_timeout() -> Option<Duration> {
    match TIMEOUT_MICROS.load(Ordering::SeqCst) {
        0 => None,
        micros => Some(Duration::from_micros(micros)),
    }
}

fn set_itimer(value: Duration) -> Result<(), TrapError> {
    let zero = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    let timer = libc::itimerval {
        it_interval: zero,
        it_value: libc::timeval {
            tv_sec: value.as_secs() as libc::time_t,
            tv_usec: value.subsec_micros() as libc::suseconds_t,
        },
    };
    // SAFETY: timer is a valid itimerval, and the old value is not requested.
    if unsafe { libc::setitimer(libc::ITIMER_REAL, &timer, ptr::null_mut()) } != 0 {
        return Err(TrapError::Timer(io::Error::last_os_error()));
    }
    Ok(())
}

/// Interval timers are not inherited across `fork`, so a freshly forked
/// checkpoint process has no armed timeout.
pub(crate) fn forget_timeout() {
    TIMEOUT_MICROS.store(0, Ordering::SeqCst);
}

/// Sets the expected-signal slot.
pub(crate) fn expect(signal: Option<TrapSignal>) {
    EXPECTED.store(signal.map_or(0, TrapSignal::as_raw), Ordering::SeqCst);
}

/// Resets the per-invocation slots: no expected signal and no timeout.
pub(crate) fn reset_for_invocation() -> Result<(), TrapError> {
    expect(None);
    set_timeout(Duration::ZERO)
}

pub(crate) fn set_current_test(index: usize) {
    CURRENT_TEST.store(index, Ordering::SeqCst);
}

/// Points the trap at a new report channel, returning the previous one.
pub(crate) fn bind_report_fd(fd: RawFd) -> Option<RawFd> {
    match REPORT_FD.swap(fd, Ordering::SeqCst) {
        -1 => None,
        previous => Some(previous),
    }
}

pub(crate) fn set_nested_pid(pid: i32) {
    NESTED_PID.store(pid, Ordering::SeqCst);
}

pub(crate) fn clear_nested_pid() {
    NESTED_PID.store(0, Ordering::SeqCst);
}

extern "C" fn on_trap(signo: libc::c_int, info: *mut libc::siginfo_t, _context: *mut libc::c_void) {
    let disposition = if EXPECTED.load(Ordering::SeqCst) == signo {
        Disposition::Expected
    } else {
        Disposition::Fatal
    };
    let timeout_micros = if signo == libc::SIGALRM {
        TIMEOUT_MICROS.load(Ordering::SeqCst)
    } else {
        0
    };
    // SAFETY: the kernel passes a valid siginfo_t for SA_SIGINFO handlers.
    // si_addr is only populated for kernel-generated faults (si_code > 0);
    // signals sent with kill or raise carry a sender pid there instead.
    let address = if !info.is_null()
        && TrapSignal::from_raw(signo).is_some_and(TrapSignal::has_fault_address)
        && unsafe { (*info).si_code } > 0
    {
        Some(unsafe { (*info).si_addr() } as u64)
    } else {
        None
    };

    let nested = NESTED_PID.swap(0, Ordering::SeqCst);
    if nested > 0 {
        // SAFETY: kill is async-signal-safe.
        unsafe { libc::kill(nested, libc::SIGKILL) };
    }

    let record = RawRecord {
        signo,
        disposition,
        address,
        test_index: CURRENT_TEST.load(Ordering::SeqCst) as u64,
        timeout_micros,
    }
    .encode();

    let fd = REPORT_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        write_all_raw(fd, &record);
    }

    // SAFETY: _exit is async-signal-safe and skips atexit handlers.
    unsafe { libc::_exit(FIRED_EXIT_CODE) }
}

fn write_all_raw(fd: RawFd, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: bytes is a valid buffer of the given length.
        let written = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if written > 0 {
            bytes = &bytes[written as usize..];
        } else if written < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
            continue;
        } else {
            return;
        }
    }
}

/// Whether a delivery matched the expected-signal slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// The signal was the one the running block expected.
    Expected,
    /// The signal was not expected: the test fails.
    Fatal,
}

/// A decoded trap record: what the handler saw when it fired.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrapReport {
    /// The delivered signal.
    pub signal: TrapSignal,
    /// Whether the signal was expected.
    pub disposition: Disposition,
    /// The faulting address, for memory and instruction faults.
    pub address: Option<u64>,
    /// The index of the test running at the time of delivery.
    pub test_index: usize,
    /// The timeout that expired, if this delivery was a timeout.
    pub timeout: Option<Duration>,
}

impl TrapReport {
    /// Returns true if this delivery was an expired timeout.
    pub fn is_timeout(&self) -> bool {
        self.signal == TrapSignal::Alrm && self.timeout.is_some()
    }

    /// Converts a fatal delivery into the failure reported for the test.
    pub fn into_failure(self) -> TestFailure {
        match self.timeout {
            Some(after) if self.signal == TrapSignal::Alrm => TestFailure::timeout(after),
            _ => TestFailure::signal(self.signal, self.address),
        }
    }

    /// Decodes a record from the tail of a report channel's contents.
    ///
    /// The handler writes its record last, after anything the checkpoint body
    /// may already have written.
    pub(crate) fn decode_trailing(bytes: &[u8]) -> Option<Self> {
        let start = bytes.len().checked_sub(RECORD_LEN)?;
        let record = RawRecord::decode(bytes[start..].try_into().ok()?)?;
        Some(Self {
            signal: TrapSignal::from_raw(record.signo)?,
            disposition: record.disposition,
            address: record.address,
            test_index: usize::try_from(record.test_index).ok()?,
            timeout: match record.timeout_micros {
                0 => None,
                micros => Some(Duration::from_micros(micros)),
            },
        })
    }
}

#[cfg(test)]
pub(crate) fn encode_report_for_test(report: &TrapReport) -> Vec<u8> {
    RawRecord {
        signo: report.signal.as_raw(),
        disposition: report.disposition,
        address: report.address,
        test_index: report.test_index as u64,
        timeout_micros: report.timeout.map_or(0, |t| t.as_micros() as u64),
    }
    .encode()
    .to_vec()
}

const RECORD_MAGIC: u32 = u32::from_be_bytes(*b"BWTR");
const RECORD_LEN: usize = 40;

// Layout, native endian:
//   0..4   magic
//   4      disposition (0 fatal, 1 expected)
//   5      address present
//   8..12  signal number
//   16..24 address
//   24..32 test index
//   32..40 armed timeout in microseconds, 0 if none
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct RawRecord {
    signo: i32,
    disposition: Disposition,
    address: Option<u64>,
    test_index: u64,
    timeout_micros: u64,
}

impl RawRecord {
    fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..4].copy_from_slice(&RECORD_MAGIC.to_ne_bytes());
        buf[4] = match self.disposition {
            Disposition::Fatal => 0,
            Disposition::Expected => 1,
        };
        buf[5] = u8::from(self.address.is_some());
        buf[8..12].copy_from_slice(&self.signo.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.address.unwrap_or(0).to_ne_bytes());
        buf[24..32].copy_from_slice(&self.test_index.to_ne_bytes());
        buf[32..40].copy_from_slice(&self.timeout_micros.to_ne_bytes());
        buf
    }

    fn decode(buf: &[u8; RECORD_LEN]) -> Option<Self> {
        let u64_at = |start: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[start..start + 8]);
            u64::from_ne_bytes(bytes)
        };

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if u32::from_ne_bytes(magic) != RECORD_MAGIC {
            return None;
        }
        let disposition = match buf[4] {
            0 => Disposition::Fatal,
            1 => Disposition::Expected,
            _ => return None,
        };
        let mut signo = [0u8; 4];
        signo.copy_from_slice(&buf[8..12]);

        Some(Self {
            signo: i32::from_ne_bytes(signo),
            disposition,
            address: (buf[5] == 1).then(|| u64_at(16)),
            test_index: u64_at(24),
            timeout_micros: u64_at(32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(signal: TrapSignal) -> RawRecord {
        RawRecord {
            signo: signal.as_raw(),
            disposition: Disposition::Fatal,
            address: None,
            test_index: 3,
            timeout_micros: 0,
        }
    }

    #[test]
    fn decodes_record_after_other_output() {
        let mut bytes = b"J{\"partial\":".to_vec();
        bytes.extend_from_slice(
            &RawRecord {
                address: Some(0x8),
                ..record(TrapSignal::Segv)
            }
            .encode(),
        );

        let report = TrapReport::decode_trailing(&bytes).expect("record decodes");
        assert_eq!(
            report,
            TrapReport {
                signal: TrapSignal::Segv,
                disposition: Disposition::Fatal,
                address: Some(0x8),
                test_index: 3,
                timeout: None,
            }
        );
        assert_eq!(
            report.into_failure().reason(),
            "Received SIGSEGV while trying to access: 0x8!"
        );
    }

    #[test]
    fn alarm_is_a_timeout_only_when_armed() {
        let plain = TrapReport::decode_trailing(&record(TrapSignal::Alrm).encode())
            .expect("record decodes");
        assert!(!plain.is_timeout());
        assert_eq!(plain.into_failure().reason(), "Received SIGALRM!");

        let timed_out = TrapReport::decode_trailing(
            &RawRecord {
                timeout_micros: 250_000,
                ..record(TrapSignal::Alrm)
            }
            .encode(),
        )
        .expect("record decodes");
        assert!(timed_out.is_timeout());
        assert_eq!(
            timed_out.into_failure().reason(),
            "Timed out after 250ms (SIGALRM)!"
        );
    }

    #[test]
    fn expected_disposition_survives_encoding() {
        let bytes = RawRecord {
            disposition: Disposition::Expected,
            ..record(TrapSignal::Fpe)
        }
        .encode();
        let report = TrapReport::decode_trailing(&bytes).expect("record decodes");
        assert_eq!(report.disposition, Disposition::Expected);
        assert_eq!(report.signal, TrapSignal::Fpe);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(TrapReport::decode_trailing(b""), None);
        assert_eq!(TrapReport::decode_trailing(&[0u8; RECORD_LEN]), None);
        assert_eq!(
            TrapReport::decode_trailing(b"J{\"Success\":null} and some more text"),
            None
        );

        let mut unknown_signal = record(TrapSignal::Term);
        unknown_signal.signo = libc::SIGKILL;
        assert_eq!(TrapReport::decode_trailing(&unknown_signal.encode()), None);
    }

    #[test]
    fn expected_slot_round_trips() {
        expect(Some(TrapSignal::Abrt));
        assert_eq!(EXPECTED.load(Ordering::SeqCst), libc::SIGABRT);
        expect(None);
        assert_eq!(EXPECTED.load(Ordering::SeqCst), 0);
    }
}
