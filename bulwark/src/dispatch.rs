// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line entry point for suite binaries.

use crate::{
    config::{ConfigOverrides, ConfigSource, HarnessConfig},
    errors::HarnessError,
    exit_codes::ExitCodePolicy,
    output::Color,
    registry::Registry,
    reporter::{ReporterBuilder, ReporterOutput},
    runner::TestRunner,
};
use camino::Utf8PathBuf;
use clap::Parser;
use std::{num::NonZeroU32, time::Duration};

/// Command-line options accepted by every suite binary.
#[derive(Debug, Default, Parser)]
#[command(about = "Run this crash-resilient test suite", version)]
pub struct HarnessOpts {
    /// Config file [default: bulwark.toml in the current directory, if present]
    #[arg(long, value_name = "PATH", env = "BULWARK_CONFIG")]
    config_file: Option<Utf8PathBuf>,

    #[clap(flatten)]
    run: RunOpts,

    #[clap(flatten)]
    report: ReportOpts,
}

/// Run options.
#[derive(Debug, Default, clap::Args)]
#[command(next_help_heading = "RUN OPTIONS")]
struct RunOpts {
    /// Number of times to invoke each test body [default: from config]
    #[arg(
        long,
        value_name = "N",
        env = "BULWARK_REPEAT",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    repeat: Option<u32>,

    /// Stop the run on the first failure
    #[arg(long, overrides_with = "no_fail_fast", env = "BULWARK_FAIL_FAST")]
    fail_fast: bool,

    /// Run all tests regardless of failure
    #[arg(long, overrides_with = "fail_fast")]
    no_fail_fast: bool,

    /// Timeout for every test invocation, e.g. 500ms or 2s; 0s disables it
    #[arg(
        long,
        value_name = "DURATION",
        env = "BULWARK_TIMEOUT",
        value_parser = humantime::parse_duration
    )]
    timeout: Option<Duration>,

    /// How the exit code is derived from the results [default: from config]
    #[arg(long, value_enum, value_name = "POLICY", env = "BULWARK_EXIT_CODE")]
    exit_code: Option<ExitCodePolicy>,

    /// Raise SIGTRAP on assertion failures if a debugger is attached
    #[arg(long, env = "BULWARK_BREAK_ON_FAILURE")]
    break_on_failure: bool,
}

/// Reporter options.
#[derive(Debug, Default, clap::Args)]
#[command(next_help_heading = "REPORTER OPTIONS")]
struct ReportOpts {
    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        hide_possible_values = true,
        value_name = "WHEN",
        env = "BULWARK_COLOR"
    )]
    color: Option<Color>,

    /// Don't print a line for successful tests
    #[arg(long)]
    hide_success: bool,

    /// Print the reason given for skipped tests
    #[arg(long)]
    show_skip_reason: bool,

    /// Don't print the run time in the summary
    #[arg(long)]
    no_time: bool,
}

impl HarnessOpts {
    /// The color choice from the command line, used before the config is loaded.
    pub fn early_color(&self) -> Color {
        self.report.color.unwrap_or_default()
    }

    /// Converts the options into config overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        let fail_fast = if self.run.no_fail_fast {
            Some(false)
        } else if self.run.fail_fast {
            Some(true)
        } else {
            None
        };

        ConfigOverrides {
            repeat: self.run.repeat.and_then(NonZeroU32::new),
            fail_fast,
            timeout: self.run.timeout,
            exit_code: self.run.exit_code,
            break_on_failure: self.run.break_on_failure.then_some(true),
            color: self.report.color,
            print_success: self.report.hide_success.then_some(false),
            print_skip_reason: self.report.show_skip_reason.then_some(true),
            print_time: self.report.no_time.then_some(false),
        }
    }

    /// Loads the configuration, runs every test in `registry` and returns
    /// the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration can't be loaded or the run
    /// can't be carried out.
    pub fn exec(&self, registry: &Registry) -> Result<i32, HarnessError> {
        let source = match &self.config_file {
            Some(path) => ConfigSource::Explicit(path),
            None => ConfigSource::Discover,
        };
        let config = HarnessConfig::load(source, &self.overrides())?;

        let mut builder = ReporterBuilder::from_config(&config.report);
        builder.set_colorize(
            config
                .report
                .color
                .should_colorize(supports_color::Stream::Stdout),
        );
        let mut reporter = builder.build(ReporterOutput::Terminal);

        let runner = TestRunner::new(registry, &config.run);
        let stats = runner.execute(|event| reporter.report_event(event))?;
        Ok(config.run.exit_code.exit_code(stats.failed))
    }
}

/// Parses the command line, runs `registry` and exits the process.
///
/// The exit code follows the configured
/// [`ExitCodePolicy`]; harness errors exit with the
/// code documented on [`HarnessExitCode`](crate::exit_codes::HarnessExitCode).
pub fn run_main(registry: Registry) -> ! {
    let opts = HarnessOpts::parse();
    opts.early_color().init();

    match opts.exec(&registry) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr();
            std::process::exit(error.process_exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> HarnessOpts {
        HarnessOpts::try_parse_from(std::iter::once("suite").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn verify_app() {
        HarnessOpts::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_no_overrides() {
        let overrides = parse(&[]).overrides();
        assert_eq!(overrides.repeat, None);
        assert_eq!(overrides.fail_fast, None);
        assert_eq!(overrides.timeout, None);
        assert_eq!(overrides.print_success, None);
    }

    #[test]
    fn flags_become_overrides() {
        let overrides = parse(&[
            "--repeat",
            "3",
            "--fail-fast",
            "--timeout",
            "1s 500ms",
            "--exit-code",
            "failure-count",
            "--color",
            "never",
            "--hide-success",
            "--show-skip-reason",
            "--no-time",
        ])
        .overrides();
        assert_eq!(overrides.repeat.map(NonZeroU32::get), Some(3));
        assert_eq!(overrides.fail_fast, Some(true));
        assert_eq!(overrides.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(overrides.exit_code, Some(ExitCodePolicy::FailureCount));
        assert_eq!(overrides.color, Some(Color::Never));
        assert_eq!(overrides.print_success, Some(false));
        assert_eq!(overrides.print_skip_reason, Some(true));
        assert_eq!(overrides.print_time, Some(false));
    }

    #[test]
    fn last_fail_fast_flag_wins() {
        assert_eq!(
            parse(&["--fail-fast", "--no-fail-fast"]).overrides().fail_fast,
            Some(false)
        );
        assert_eq!(
            parse(&["--no-fail-fast", "--fail-fast"]).overrides().fail_fast,
            Some(true)
        );
    }

    #[test]
    fn zero_repeat_is_rejected() {
        HarnessOpts::try_parse_from(["suite", "--repeat", "0"]).expect_err("repeat must be >= 1");
    }
}
