// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exit codes and exit code policies.

use clap::ValueEnum;
use serde::Deserialize;

/// Documented exit codes for bulwark suites.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum HarnessExitCode {}

impl HarnessExitCode {
    /// No tests failed.
    pub const OK: i32 = 0;

    /// One or more tests failed, or the run was aborted.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// A user issue happened while setting up the run, such as an invalid config file.
    pub const SETUP_ERROR: i32 = 96;
}

/// How the final exit status is derived from the run's results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExitCodePolicy {
    /// Exit with [`HarnessExitCode::TEST_RUN_FAILED`] if any test failed.
    #[default]
    Status,

    /// Exit with the number of failed tests, saturating at 255.
    FailureCount,

    /// Always exit with 0.
    AlwaysZero,
}

impl ExitCodePolicy {
    /// Computes the exit code for a run with `failed` failures.
    pub fn exit_code(self, failed: usize) -> i32 {
        match self {
            Self::Status if failed == 0 => HarnessExitCode::OK,
            Self::Status => HarnessExitCode::TEST_RUN_FAILED,
            // Exit statuses are truncated to 8 bits, so saturate rather than wrap back to 0.
            Self::FailureCount => failed.min(255) as i32,
            Self::AlwaysZero => HarnessExitCode::OK,
        }
    }
}
