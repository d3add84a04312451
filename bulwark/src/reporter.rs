// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints test results as the run progresses.
//!
//! The main structure in this module is [`TestReporter`].

use crate::{config::ReportConfig, outcome::Outcome, runner::RunStats};
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};
use swrite::{SWrite, swrite};

/// An event emitted by the [`TestRunner`](crate::runner::TestRunner).
#[derive(Clone, Debug)]
pub enum TestEvent<'a> {
    /// The run is starting.
    RunStarted {
        /// The number of tests that will be run.
        test_count: usize,
    },
    /// A test finished with an outcome.
    TestFinished {
        /// The test's name.
        name: &'a str,
        /// The test's position in the registry.
        index: usize,
        /// How the test ended.
        outcome: &'a Outcome,
        /// How long the test took, including its checkpoint.
        time_taken: Duration,
    },
    /// The run is over.
    RunFinished {
        /// Final statistics.
        stats: RunStats,
        /// How long the whole run took.
        elapsed: Duration,
    },
}

/// Where the reporter writes to.
pub enum ReporterOutput<'a> {
    /// Write to standard output.
    Terminal,
    /// Write to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    should_colorize: bool,
    print_success: bool,
    print_skip_reason: bool,
    print_time: bool,
}

impl ReporterBuilder {
    /// Creates a builder for the given report configuration.
    ///
    /// Colorization is not derived from the config's color choice; set it
    /// with [`Self::set_colorize`].
    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            should_colorize: false,
            print_success: config.print_success,
            print_skip_reason: config.print_skip_reason,
            print_time: config.print_time,
        }
    }

    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets whether successful tests get a line of their own.
    pub fn set_print_success(&mut self, print_success: bool) -> &mut Self {
        self.print_success = print_success;
        self
    }

    /// Sets whether skip reasons are printed.
    pub fn set_print_skip_reason(&mut self, print_skip_reason: bool) -> &mut Self {
        self.print_skip_reason = print_skip_reason;
        self
    }

    /// Sets whether the summary includes the run time.
    pub fn set_print_time(&mut self, print_time: bool) -> &mut Self {
        self.print_time = print_time;
        self
    }

    /// Creates a new test reporter.
    pub fn build<'a>(&self, output: ReporterOutput<'a>) -> TestReporter<'a> {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }
        TestReporter {
            styles,
            print_success: self.print_success,
            print_skip_reason: self.print_skip_reason,
            print_time: self.print_time,
            output,
        }
    }
}

/// Writes one line per finished test, then a summary.
pub struct TestReporter<'a> {
    styles: Styles,
    print_success: bool,
    print_skip_reason: bool,
    print_time: bool,
    output: ReporterOutput<'a>,
}

impl TestReporter<'_> {
    /// Reports a test event.
    pub fn report_event(&mut self, event: TestEvent<'_>) -> io::Result<()> {
        let mut buf = String::new();
        self.write_event(&event, &mut buf);
        if buf.is_empty() {
            return Ok(());
        }

        match &mut self.output {
            ReporterOutput::Terminal => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(buf.as_bytes())?;
                // Test processes fork from this one; nothing may stay buffered.
                stdout.flush()
            }
            ReporterOutput::Buffer(vec) => {
                vec.extend_from_slice(buf.as_bytes());
                Ok(())
            }
        }
    }

    fn write_event(&self, event: &TestEvent<'_>, out: &mut String) {
        match event {
            TestEvent::RunStarted { .. } => {}
            TestEvent::TestFinished { name, outcome, .. } => self.write_finished(name, outcome, out),
            TestEvent::RunFinished { stats, elapsed } => self.write_summary(stats, *elapsed, out),
        }
    }

    fn write_finished(&self, name: &str, outcome: &Outcome, out: &mut String) {
        let status_style = match outcome {
            Outcome::Success if !self.print_success => return,
            Outcome::Success => self.styles.pass,
            Outcome::Failure(_) | Outcome::UnrecognizedError(_) => self.styles.fail,
            Outcome::Skipped(_) => self.styles.skip,
        };

        swrite!(
            out,
            "Test '{}' {}!",
            name,
            outcome.status_str().style(status_style)
        );
        match outcome {
            Outcome::Success => {}
            Outcome::Failure(failure) => swrite!(out, " Error: {}", failure.reason()),
            Outcome::UnrecognizedError(diagnostic) => {
                swrite!(out, " Unrecognized error raised! Exception: {diagnostic}")
            }
            Outcome::Skipped(reason) if self.print_skip_reason => {
                swrite!(out, " Reason: {reason}")
            }
            Outcome::Skipped(_) => {}
        }
        out.push('\n');
    }

    fn write_summary(&self, stats: &RunStats, elapsed: Duration, out: &mut String) {
        let test_str = if stats.executed == 1 { "test" } else { "tests" };
        swrite!(
            out,
            "\nExecuted {} {test_str}, {} failed, {} succeeded.",
            stats.executed.style(self.styles.count),
            stats.failed.style(self.styles.count),
            stats.succeeded.style(self.styles.count),
        );
        if self.print_time {
            swrite!(out, " (time: {:.3}ms)", elapsed.as_secs_f64() * 1000.0);
        }
        out.push('\n');
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
    }
}
