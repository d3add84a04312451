// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Harness configuration.
//!
//! Configuration is layered: the embedded defaults, then an optional TOML
//! file, then [`ConfigOverrides`] from the command line and environment.

use crate::{errors::ConfigError, exit_codes::ExitCodePolicy, output::Color};
use camino::Utf8Path;
use serde::Deserialize;
use std::{collections::BTreeSet, io, num::NonZeroU32, time::Duration};
use tracing::{debug, warn};

/// The file name looked for in the current directory when no config file is
/// given explicitly.
pub const DISCOVERED_FILE_NAME: &str = "bulwark.toml";

const DEFAULT_CONFIG: &str = include_str!("../default-config.toml");

/// Where to load the configuration file from.
#[derive(Clone, Copy, Debug)]
pub enum ConfigSource<'a> {
    /// Use [`DISCOVERED_FILE_NAME`] in the current directory if it exists.
    Discover,
    /// Use this file, which must exist.
    Explicit(&'a Utf8Path),
}

/// The resolved harness configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HarnessConfig {
    /// How tests are run.
    pub run: RunConfig,
    /// How results are printed.
    pub report: ReportConfig,
}

/// The `[run]` section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunConfig {
    /// How many times each test body is invoked.
    pub repeat: NonZeroU32,
    /// Stop after the first failing test.
    pub fail_fast: bool,
    /// The timeout armed before every invocation, if any.
    pub timeout: Option<Duration>,
    /// How the exit code is derived from the results.
    pub exit_code: ExitCodePolicy,
    /// Raise `SIGTRAP` on assertion failures when a debugger is attached.
    pub break_on_failure: bool,
}

/// The `[report]` section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReportConfig {
    /// When to colorize output.
    pub color: Color,
    /// Print a line for every successful test.
    pub print_success: bool,
    /// Print the reason given for skipped tests.
    pub print_skip_reason: bool,
    /// Print the total run time in the summary.
    pub print_time: bool,
}

/// Settings from the command line and environment, applied last.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Overrides `run.repeat`.
    pub repeat: Option<NonZeroU32>,
    /// Overrides `run.fail-fast`.
    pub fail_fast: Option<bool>,
    /// Overrides `run.timeout`. A zero duration disables the timeout.
    pub timeout: Option<Duration>,
    /// Overrides `run.exit-code`.
    pub exit_code: Option<ExitCodePolicy>,
    /// Overrides `run.break-on-failure`.
    pub break_on_failure: Option<bool>,
    /// Overrides `report.color`.
    pub color: Option<Color>,
    /// Overrides `report.print-success`.
    pub print_success: Option<bool>,
    /// Overrides `report.print-skip-reason`.
    pub print_skip_reason: Option<bool>,
    /// Overrides `report.print-time`.
    pub print_time: Option<bool>,
}

impl HarnessConfig {
    /// Returns the built-in defaults.
    ///
    /// # Errors
    ///
    /// Fails only if the embedded defaults are invalid.
    pub fn defaults() -> Result<Self, ConfigError> {
        let deserializer =
            toml::Deserializer::parse(DEFAULT_CONFIG).map_err(ConfigError::InvalidDefault)?;
        let config =
            DefaultConfig::deserialize(deserializer).map_err(ConfigError::InvalidDefault)?;
        Ok(config.into())
    }

    /// Loads the configuration from `source`, then applies `overrides`.
    ///
    /// Unknown keys in the file are reported as warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or if the file can't
    /// be read or parsed.
    pub fn load(source: ConfigSource<'_>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::defaults()?;

        let file = match source {
            ConfigSource::Discover => {
                DeserializedConfig::from_path(Utf8Path::new(DISCOVERED_FILE_NAME))?
            }
            ConfigSource::Explicit(path) => Some(
                DeserializedConfig::from_path(path)?
                    .ok_or_else(|| ConfigError::FileNotFound {
                        path: path.to_owned(),
                    })?,
            ),
        };
        if let Some(file) = file {
            config.apply_file(file);
        }

        config.apply_overrides(overrides);
        debug!("resolved config: {config:?}");
        Ok(config)
    }

    fn apply_file(&mut self, file: DeserializedConfig) {
        let DeserializedConfig { run, report } = file;
        apply(&mut self.run.repeat, run.repeat);
        apply(&mut self.run.fail_fast, run.fail_fast);
        if let Some(timeout) = run.timeout {
            self.run.timeout = nonzero_timeout(timeout);
        }
        apply(&mut self.run.exit_code, run.exit_code);
        apply(&mut self.run.break_on_failure, run.break_on_failure);

        apply(&mut self.report.color, report.color);
        apply(&mut self.report.print_success, report.print_success);
        apply(&mut self.report.print_skip_reason, report.print_skip_reason);
        apply(&mut self.report.print_time, report.print_time);
    }

    /// Applies command-line and environment overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        apply(&mut self.run.repeat, overrides.repeat);
        apply(&mut self.run.fail_fast, overrides.fail_fast);
        if let Some(timeout) = overrides.timeout {
            self.run.timeout = nonzero_timeout(timeout);
        }
        apply(&mut self.run.exit_code, overrides.exit_code);
        apply(&mut self.run.break_on_failure, overrides.break_on_failure);

        apply(&mut self.report.color, overrides.color);
        apply(&mut self.report.print_success, overrides.print_success);
        apply(&mut self.report.print_skip_reason, overrides.print_skip_reason);
        apply(&mut self.report.print_time, overrides.print_time);
    }
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn nonzero_timeout(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

/// Default configuration with all values required.
///
/// Parsed from the embedded default config TOML: if any key is missing,
/// parsing fails.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultConfig {
    run: DefaultRunConfig,
    report: DefaultReportConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultRunConfig {
    repeat: NonZeroU32,
    fail_fast: bool,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    exit_code: ExitCodePolicy,
    break_on_failure: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultReportConfig {
    color: Color,
    print_success: bool,
    print_skip_reason: bool,
    print_time: bool,
}

impl From<DefaultConfig> for HarnessConfig {
    fn from(config: DefaultConfig) -> Self {
        let DefaultConfig { run, report } = config;
        Self {
            run: RunConfig {
                repeat: run.repeat,
                fail_fast: run.fail_fast,
                timeout: nonzero_timeout(run.timeout),
                exit_code: run.exit_code,
                break_on_failure: run.break_on_failure,
            },
            report: ReportConfig {
                color: report.color,
                print_success: report.print_success,
                print_skip_reason: report.print_skip_reason,
                print_time: report.print_time,
            },
        }
    }
}

/// A configuration file (deserialized form).
///
/// All fields are optional; unspecified fields keep their defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    run: DeserializedRunConfig,
    #[serde(default)]
    report: DeserializedReportConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedRunConfig {
    repeat: Option<NonZeroU32>,
    fail_fast: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    exit_code: Option<ExitCodePolicy>,
    break_on_failure: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedReportConfig {
    color: Option<Color>,
    print_success: Option<bool>,
    print_skip_reason: Option<bool>,
    print_time: Option<bool>,
}

impl DeserializedConfig {
    /// Loads a config file, returning `None` if it doesn't exist.
    fn from_path(path: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        debug!("config: attempting to load from {path}");
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("config: file does not exist at {path}");
                return Ok(None);
            }
            Err(error) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };

        let (config, unknown) =
            Self::deserialize_toml(&contents).map_err(|error| ConfigError::Parse {
                path: path.to_owned(),
                error,
            })?;

        if !unknown.is_empty() {
            warn!(
                "ignoring unknown config keys in {path}: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        debug!("config: loaded from {path}");
        Ok(Some(config))
    }

    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedConfig = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}
