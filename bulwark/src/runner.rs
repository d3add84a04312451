// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run scheduler.
//!
//! The main structure in this module is [`TestRunner`].

use crate::{
    checkpoint::{self, Resumption},
    config::RunConfig,
    errors::RunError,
    outcome::{FailureKind, Outcome, TestFailure},
    registry::Registry,
    reporter::TestEvent,
    sandbox::{self, UnitSettings},
    stopwatch::stopwatch,
};
use std::io;
use tracing::{debug, info};

/// Runs the tests of a [`Registry`] in order, one checkpoint per test.
#[derive(Debug)]
pub struct TestRunner<'a> {
    registry: &'a Registry,
    settings: UnitSettings,
    fail_fast: bool,
}

impl<'a> TestRunner<'a> {
    /// Creates a runner for `registry` with the given run settings.
    pub fn new(registry: &'a Registry, config: &RunConfig) -> Self {
        Self {
            registry,
            settings: UnitSettings {
                repeat: config.repeat.get(),
                timeout: config.timeout,
                break_on_failure: config.break_on_failure,
            },
            fail_fast: config.fail_fast,
        }
    }

    /// Executes the tests, calling `callback` with each event.
    ///
    /// A test that crashes, times out or exits on its own is reported as
    /// failed; the run then carries on with the next test.
    ///
    /// # Errors
    ///
    /// Returns an error if a checkpoint could not be established or if the
    /// callback fails. The run stops at that point.
    pub fn execute<F>(&self, mut callback: F) -> Result<RunStats, RunError>
    where
        F: FnMut(TestEvent<'_>) -> io::Result<()>,
    {
        let run_stopwatch = stopwatch();
        let mut stats = RunStats {
            initial_run_count: self.registry.len(),
            ..RunStats::default()
        };
        callback(TestEvent::RunStarted {
            test_count: stats.initial_run_count,
        })
        .map_err(RunError::Write)?;

        let handlers = self.registry.handlers();
        for (index, unit) in self.registry.tests().iter().enumerate() {
            debug!("running test {index} `{}`", unit.name());
            let unit_stopwatch = stopwatch();
            let resumption = checkpoint::establish_isolated(|| {
                sandbox::run_unit(unit, index, handlers, self.settings)
            })
            .map_err(|error| RunError::Checkpoint {
                name: unit.name().to_owned(),
                error,
            })?;
            let outcome = outcome_of(resumption);
            let time_taken = unit_stopwatch.snapshot().duration;

            stats.on_test_finished(&outcome);
            callback(TestEvent::TestFinished {
                name: unit.name(),
                index,
                outcome: &outcome,
                time_taken,
            })
            .map_err(RunError::Write)?;

            if self.fail_fast && outcome.is_failure() {
                info!(
                    "stopping after the first failure, {} tests not run",
                    stats.initial_run_count - stats.executed
                );
                break;
            }
        }

        callback(TestEvent::RunFinished {
            stats,
            elapsed: run_stopwatch.snapshot().duration,
        })
        .map_err(RunError::Write)?;
        Ok(stats)
    }
}

fn outcome_of(resumption: Resumption<Outcome>) -> Outcome {
    match resumption {
        Resumption::Completed(outcome) => outcome,
        Resumption::Fired(report) => Outcome::Failure(report.into_failure()),
        Resumption::Exited { code } => Outcome::Failure(TestFailure::exited(code)),
        Resumption::Killed { signal } => Outcome::Failure(TestFailure::killed(signal)),
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the beginning.
    ///
    /// If the run stopped early because of fail-fast, this will be more than
    /// `executed` at the end.
    pub initial_run_count: usize,

    /// The number of tests that ran.
    pub executed: usize,

    /// The number of tests that did not fail. Includes `skipped`.
    pub succeeded: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,

    /// The number of tests that failed. Includes `crashed` and `timed_out`.
    pub failed: usize,

    /// The number of failed tests that were ended by a fatal signal or
    /// stopped reporting.
    pub crashed: usize,

    /// The number of failed tests that timed out.
    pub timed_out: usize,
}

impl RunStats {
    /// Returns true if every test ran and none failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.executed == self.initial_run_count
    }

    /// The number of tests that were not run because the run stopped early.
    pub fn not_run(&self) -> usize {
        self.initial_run_count.saturating_sub(self.executed)
    }

    pub(crate) fn on_test_finished(&mut self, outcome: &Outcome) {
        self.executed += 1;
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Skipped(_) => {
                self.succeeded += 1;
                self.skipped += 1;
            }
            Outcome::Failure(failure) => {
                self.failed += 1;
                match failure.kind() {
                    FailureKind::Assertion => {}
                    FailureKind::Timeout { .. } => self.timed_out += 1,
                    FailureKind::Signal { .. }
                    | FailureKind::Exited { .. }
                    | FailureKind::Killed { .. } => self.crashed += 1,
                }
            }
            Outcome::UnrecognizedError(_) => self.failed += 1,
        }
    }
}
