// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the harness itself.
//!
//! Failures of the code under test are not errors in this sense: they are
//! [`Outcome`](crate::outcome::Outcome)s.

use crate::{exit_codes::HarnessExitCode, signal::TrapSignal};
use camino::Utf8PathBuf;
use std::{error::Error, io};
use thiserror::Error;

/// An error that occurred while loading harness configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file `{path}`")]
    Read {
        /// The path that was read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse config file `{path}`")]
    Parse {
        /// The path that was parsed.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },

    /// An explicitly requested configuration file does not exist.
    #[error("config file `{path}` not found")]
    FileNotFound {
        /// The path that was requested.
        path: Utf8PathBuf,
    },

    /// The embedded default configuration failed to parse.
    #[error("embedded default config is invalid")]
    InvalidDefault(#[source] toml::de::Error),
}

/// An error that occurred while installing the signal trap.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrapError {
    /// The trap was already installed in this process.
    #[error("signal trap is already installed in this process")]
    AlreadyInstalled,

    /// The alternate signal stack could not be registered.
    #[error("failed to register the alternate signal stack")]
    AltStack(#[source] io::Error),

    /// A signal handler could not be registered.
    #[error("failed to install handler for {signal}")]
    Sigaction {
        /// The signal whose handler failed to install.
        signal: TrapSignal,
        /// The underlying error.
        #[source]
        error: nix::Error,
    },

    /// The trapped signals could not be unblocked.
    #[error("failed to unblock trapped signals")]
    Unblock(#[source] nix::Error),

    /// The timeout timer could not be armed.
    #[error("failed to arm the timeout timer")]
    Timer(#[source] io::Error),
}

/// An error that occurred while establishing or resuming from a checkpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckpointError {
    /// The report channel could not be created.
    #[error("failed to create checkpoint report channel")]
    Pipe(#[source] io::Error),

    /// The checkpoint process could not be forked.
    #[error("failed to fork checkpoint process")]
    Fork(#[source] nix::Error),

    /// Reading the checkpoint's report failed.
    #[error("failed to read checkpoint report")]
    Read(#[source] io::Error),

    /// Waiting for the checkpoint process failed.
    #[error("failed to wait for checkpoint process {pid}")]
    Wait {
        /// The checkpoint process ID.
        pid: i32,
        /// The underlying error.
        #[source]
        error: nix::Error,
    },

    /// The checkpoint process reported a result that could not be decoded.
    #[error("checkpoint process {pid} sent a malformed report")]
    Decode {
        /// The checkpoint process ID.
        pid: i32,
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that aborted a test run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// A test's checkpoint could not be established.
    #[error("failed to run test `{name}`")]
    Checkpoint {
        /// The test that was about to run.
        name: String,
        /// The underlying error.
        #[source]
        error: CheckpointError,
    },

    /// Writing to the reporter's output failed.
    #[error("failed to write test report")]
    Write(#[source] io::Error),
}

/// A top-level harness error, as surfaced by [`run_main`](crate::run_main).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// Loading configuration failed.
    #[error("failed to load configuration")]
    Config(#[from] ConfigError),

    /// The test run failed.
    #[error("test run aborted")]
    Run(#[from] RunError),
}

impl HarnessError {
    /// Returns the process exit code for this error.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => HarnessExitCode::SETUP_ERROR,
            Self::Run(_) => HarnessExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error and its causes through the logger.
    pub fn display_to_stderr(&self) {
        tracing::error!("{self}");
        let mut next_error = self.source();
        while let Some(err) = next_error {
            tracing::error!(target: "bulwark::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
