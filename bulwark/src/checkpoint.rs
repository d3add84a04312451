// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resumption checkpoints.
//!
//! [`establish`] runs a body in a forked checkpoint process. When the body
//! returns, its result is serialized back to the caller. When the
//! [trap](crate::trap) intercepts a signal inside the body, the handler writes
//! its record and terminates the checkpoint process: that is what "firing"
//! the checkpoint means, and the caller's `waitpid` is the resumption point.
//!
//! Because the body runs in its own address space, its memory effects are
//! never visible to the caller. Only the returned value crosses the boundary.
//!
//! A checkpoint established with [`establish_isolated`] also leads a new
//! process group. Nested checkpoint processes stay in that group, so once
//! the outermost checkpoint process has ended, whatever it left behind can
//! be killed in one go.

use crate::{errors::CheckpointError, trap, trap::TrapReport};
use nix::{
    errno::Errno,
    sys::{
        signal::{Signal, killpg},
        wait::{WaitStatus, waitpid},
    },
    unistd::{ForkResult, Pid, fork, setpgid},
};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    io::{self, PipeReader, PipeWriter, Read, Write},
    os::fd::AsRawFd,
    panic::{self, AssertUnwindSafe},
};
use tracing::debug;

/// Marks a report written by a body that ran to completion.
const COMPLETED_TAG: u8 = b'J';

/// Exit code of a checkpoint process that completed but couldn't send its result.
const SEND_FAILED_EXIT_CODE: i32 = 0x63;

/// Exit code of a checkpoint process whose body panicked past the checkpoint.
const PANICKED_EXIT_CODE: i32 = 0x64;

/// How control came back from a checkpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resumption<T> {
    /// The body returned this value.
    Completed(T),
    /// The trap fired.
    Fired(TrapReport),
    /// The checkpoint process exited without reporting, e.g. through
    /// `std::process::exit`.
    Exited {
        /// The exit code.
        code: i32,
    },
    /// The checkpoint process was killed by a signal the trap didn't handle.
    Killed {
        /// The raw signal number.
        signal: i32,
    },
}

/// Which process group a checkpoint process runs in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Grouping {
    /// Stay in the caller's process group.
    Inherit,
    /// Lead a new process group that is killed once the checkpoint ends.
    Lead,
}

/// Runs `body` behind a checkpoint and reports how control came back.
///
/// The body should not let panics escape: a panic that does is reported as
/// [`Resumption::Exited`].
///
/// # Errors
///
/// Returns an error if the checkpoint process could not be created, waited
/// for, or if its report could not be decoded.
pub fn establish<T, F>(body: F) -> Result<Resumption<T>, CheckpointError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    establish_in(Grouping::Inherit, body)
}

/// Like [`establish`], but the checkpoint process leads a new process group.
///
/// Once the checkpoint process has ended, every process still in its group
/// is killed with `SIGKILL`. That covers nested checkpoint processes
/// orphaned when the trap fired, and anything else the body started.
///
/// # Errors
///
/// Same as [`establish`].
pub fn establish_isolated<T, F>(body: F) -> Result<Resumption<T>, CheckpointError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    establish_in(Grouping::Lead, body)
}

fn establish_in<T, F>(grouping: Grouping, body: F) -> Result<Resumption<T>, CheckpointError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    // Buffered output would otherwise be written twice, once by each process.
    flush_std_streams();

    let (mut reader, writer) = io::pipe().map_err(CheckpointError::Pipe)?;

    // SAFETY: the harness runs tests on a single thread. The child only runs
    // the body and then leaves through _exit.
    match unsafe { fork() }.map_err(CheckpointError::Fork)? {
        ForkResult::Child => {
            drop(reader);
            if grouping == Grouping::Lead {
                // The parent makes the same call; whichever runs first wins.
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
            }
            run_body(body, writer)
        }
        ForkResult::Parent { child } => {
            drop(writer);
            if grouping == Grouping::Lead
                && let Err(errno) = setpgid(child, child)
            {
                debug!("failed to move process {child} into its own group: {errno}");
            }
            debug!("established checkpoint in process {child}");
            trap::set_nested_pid(child.as_raw());
            let resumption = resume(child, &mut reader, grouping);
            trap::clear_nested_pid();
            resumption
        }
    }
}

fn run_body<T, F>(body: F, mut writer: PipeWriter) -> !
where
    T: Serialize,
    F: FnOnce() -> T,
{
    if let Some(inherited) = trap::bind_report_fd(writer.as_raw_fd()) {
        // The enclosing checkpoint's channel belongs to the enclosing process.
        // Holding it open here would delay its end-of-file. The owning handle
        // lives in a stack frame this process leaves through _exit.
        //
        // SAFETY: this process never uses that descriptor again.
        unsafe { libc::close(inherited) };
    }
    trap::clear_nested_pid();

    let code = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => match send_result(&value, &mut writer) {
            Ok(()) => 0,
            Err(_) => SEND_FAILED_EXIT_CODE,
        },
        Err(_) => PANICKED_EXIT_CODE,
    };
    flush_std_streams();
    // SAFETY: _exit skips destructors and atexit handlers, which belong to
    // the process that established the checkpoint.
    unsafe { libc::_exit(code) }
}

fn send_result<T: Serialize>(value: &T, writer: &mut PipeWriter) -> io::Result<()> {
    let mut buf = vec![COMPLETED_TAG];
    serde_json::to_writer(&mut buf, value)?;
    writer.write_all(&buf)?;
    writer.flush()
}

fn resume<T: DeserializeOwned>(
    child: Pid,
    reader: &mut PipeReader,
    grouping: Grouping,
) -> Result<Resumption<T>, CheckpointError> {
    let mut buf = Vec::new();
    // Always reap the child, even if reading failed.
    let read_result = reader.read_to_end(&mut buf);
    if grouping == Grouping::Lead {
        // Before reaping: the unreaped leader keeps the group id from being reused.
        kill_group(child);
    }
    let status = wait_for(child)?;
    read_result.map_err(CheckpointError::Read)?;
    decode(child, &buf, status)
}

fn kill_group(leader: Pid) {
    match killpg(leader, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => debug!("failed to kill process group {leader}: {errno}"),
    }
}

fn wait_for(child: Pid) -> Result<WaitStatus, CheckpointError> {
    loop {
        match waitpid(child, None) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => return Ok(status),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(error) => {
                return Err(CheckpointError::Wait {
                    pid: child.as_raw(),
                    error,
                });
            }
        }
    }
}

fn decode<T: DeserializeOwned>(
    child: Pid,
    buf: &[u8],
    status: WaitStatus,
) -> Result<Resumption<T>, CheckpointError> {
    if let WaitStatus::Exited(_, trap::FIRED_EXIT_CODE) = status {
        if let Some(report) = TrapReport::decode_trailing(buf) {
            debug!(
                "checkpoint in process {child} fired: {} ({:?})",
                report.signal, report.disposition
            );
            return Ok(Resumption::Fired(report));
        }
    }

    match status {
        WaitStatus::Exited(_, 0) if buf.first() == Some(&COMPLETED_TAG) => {
            let value = serde_json::from_slice(&buf[1..]).map_err(|error| {
                CheckpointError::Decode {
                    pid: child.as_raw(),
                    error,
                }
            })?;
            Ok(Resumption::Completed(value))
        }
        WaitStatus::Signaled(_, signal, _) => Ok(Resumption::Killed {
            signal: signal as i32,
        }),
        WaitStatus::Exited(_, code) => Ok(Resumption::Exited { code }),
        // wait_for only returns the two terminal statuses.
        _ => Ok(Resumption::Exited { code: -1 }),
    }
}

pub(crate) fn flush_std_streams() {
    // Nothing useful can be done about a failed flush here.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TrapSignal;
    use nix::sys::signal::Signal;

    fn pid() -> Pid {
        Pid::from_raw(4242)
    }

    #[test]
    fn decodes_completed_value() {
        let resumption: Resumption<Option<u32>> =
            decode(pid(), b"J7", WaitStatus::Exited(pid(), 0)).expect("decodes");
        assert_eq!(resumption, Resumption::Completed(Some(7)));
    }

    #[test]
    fn malformed_completion_is_an_error() {
        let result: Result<Resumption<u32>, _> =
            decode(pid(), b"J{nope", WaitStatus::Exited(pid(), 0));
        assert!(matches!(result, Err(CheckpointError::Decode { pid: 4242, .. })));
    }

    #[test]
    fn silent_exits_and_kills() {
        let exited: Resumption<u32> =
            decode(pid(), b"", WaitStatus::Exited(pid(), 3)).expect("decodes");
        assert_eq!(exited, Resumption::Exited { code: 3 });

        // Exit code 0 without a completion tag still means the body never returned.
        let exited_zero: Resumption<u32> =
            decode(pid(), b"", WaitStatus::Exited(pid(), 0)).expect("decodes");
        assert_eq!(exited_zero, Resumption::Exited { code: 0 });

        let killed: Resumption<u32> = decode(
            pid(),
            b"",
            WaitStatus::Signaled(pid(), Signal::SIGKILL, false),
        )
        .expect("decodes");
        assert_eq!(
            killed,
            Resumption::Killed {
                signal: libc::SIGKILL
            }
        );
    }

    #[test]
    fn fired_checkpoint_carries_trap_record() {
        let report = TrapReport {
            signal: TrapSignal::Abrt,
            disposition: trap::Disposition::Fatal,
            address: None,
            test_index: 0,
            timeout: None,
        };
        let bytes = trap::encode_report_for_test(&report);
        let resumption: Resumption<u32> =
            decode(pid(), &bytes, WaitStatus::Exited(pid(), trap::FIRED_EXIT_CODE))
                .expect("decodes");
        assert_eq!(resumption, Resumption::Fired(report));

        // A record-shaped tail from a process that didn't fire is not a report.
        let exited: Resumption<u32> =
            decode(pid(), &bytes, WaitStatus::Exited(pid(), 5)).expect("decodes");
        assert_eq!(exited, Resumption::Exited { code: 5 });
    }
}
