// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! Each test runs one of the suite binaries under `test-helpers/` as a child
//! process and checks its output and exit status. Suites crash, abort, time
//! out and exit in the middle of tests, so nothing here can run in-process.

use bulwark::exit_codes::HarnessExitCode;
use camino_tempfile::Utf8TempDir;
use std::time::{Duration, Instant};

mod fixtures;

use fixtures::*;

#[test]
fn test_demo_suite() {
    let output = demo_suite()
        .args(["--no-time", "--show-skip-reason"])
        .unchecked(true)
        .output();

    check_results(
        &output,
        &[
            "Test 'demo_check_eq' failed! Error: Expected 2 to be equal 4, v[1] != 4, on line N!",
            "Test 'demo_fail' failed! Error: Oops, on line N!",
            "Test 'demo_check' failed! Error: Thief, on line N!",
            "Test 'demo_expect_panic' failed! Error: Expected panic of type std::io::error::Error, on line N!",
            "Test 'demo_signal' failed! Error: Timed out after 1s (SIGALRM)!",
            "Test 'demo_fault' failed! Error: Received SIGSEGV while trying to access: 0x8!",
            "Test 'demo_non_printable' failed! Error: Expected <non-printable value> to be equal <non-printable value>, Point { x: 1, y: 2 } != Point { x: 1, y: 3 }, on line N!",
            "Test 'demo_skip' skipped! Reason: I don't feel like testing rn",
            "Test 'demo_fallible' failed! Unrecognized error raised! Exception: disk on fire",
            "Test 'demo_final' successful!",
        ],
    );
    check_summary(&output, "Executed 10 tests, 8 failed, 2 succeeded.");
    check_exit_code(&output, HarnessExitCode::TEST_RUN_FAILED);
}

#[test]
fn test_clean_suite() {
    let output = clean_suite().arg("--no-time").output();

    check_results(
        &output,
        &[
            "Test 'arithmetic' successful!",
            "Test 'strings' successful!",
            "Test 'collections' successful!",
            "Test 'expected_abort' successful!",
            "Test 'repetition_numbers' successful!",
        ],
    );
    check_summary(&output, "Executed 5 tests, 0 failed, 5 succeeded.");
    check_exit_code(&output, HarnessExitCode::OK);
}

#[test]
fn test_signals() {
    let output = signal_suite().arg("--no-time").unchecked(true).output();

    check_results(
        &output,
        &[
            "Test 'expected_segv' successful!",
            "Test 'expected_abort' successful!",
            "Test 'expected_fpe' successful!",
            "Test 'expected_term' successful!",
            "Test 'expected_trap' successful!",
            "Test 'expected_bus' successful!",
            "Test 'expected_alarm' successful!",
            "Test 'wrong_signal' failed! Error: Expected signal SIGSEGV, but received SIGFPE, on line N!",
            "Test 'no_signal' failed! Error: Expected signal SIGFPE, on line N!",
            "Test 'fails_inside_block' failed! Error: gave up before faulting, on line N!",
            "Test 'fails_after_expected_signal' failed! Error: Expected 2 to be equal 3, 1i32 + 1 != 3i32, on line N!",
            "Test 'block_state_is_discarded' successful!",
            "Test 'timeout_in_expect_block' failed! Error: Timed out after 200ms (SIGALRM)!",
            "Test 'nested_timeout' failed! Error: Timed out after 200ms (SIGALRM)!",
            "Test 'raised_fpe' failed! Error: Received SIGFPE!",
            "Test 'raised_ill' failed! Error: Received SIGILL!",
            "Test 'raised_bus' failed! Error: Received SIGBUS!",
            "Test 'raised_term' failed! Error: Received SIGTERM!",
            "Test 'raised_trap' failed! Error: Received SIGTRAP!",
            "Test 'stack_overflow' failed! Error: Received SIGSEGV while trying to access: ADDR!",
            "Test 'abort' failed! Error: Received SIGABRT!",
            "Test 'exit' failed! Error: Test process exited with code 3 before reporting a result!",
            "Test 'killed' failed! Error: Test process was killed by SIGKILL!",
            "Test 'install_twice' successful!",
            "Test 'timer_state' successful!",
            "Test 'survivor' successful!",
        ],
    );
    check_summary(&output, "Executed 26 tests, 15 failed, 11 succeeded.");
    check_exit_code(&output, HarnessExitCode::TEST_RUN_FAILED);
}

#[test]
fn test_nested_timeout_leaves_no_process() {
    let temp_dir = Utf8TempDir::new().expect("created temp dir");
    let pid_file = temp_dir.path().join("nested.pid");

    let output = signal_suite()
        .arg("--no-time")
        .env("SIGNAL_SUITE_PID_FILE", pid_file.as_str())
        .unchecked(true)
        .output();
    let line = output
        .result_lines()
        .into_iter()
        .find(|line| line.starts_with("Test 'nested_timeout'"))
        .expect("nested_timeout line is present");
    assert_eq!(
        line,
        "Test 'nested_timeout' failed! Error: Timed out after 200ms (SIGALRM)!"
    );

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .expect("innermost process wrote its pid")
        .trim()
        .parse()
        .expect("pid file holds a number");
    assert!(
        wait_until_gone(pid, Duration::from_secs(2)),
        "process {pid} from the nested expect block outlived the run:\n{output}"
    );
}

#[test]
fn test_translation_handlers() {
    let output = handler_suite().arg("--no-time").unchecked(true).output();

    check_results(
        &output,
        &[
            "Test 'io_error' failed! Error: I/O error: config.toml",
            "Test 'quota' failed! Error: quota exceeded: 12 > 10, on line N!",
            "Test 'integer' failed! Unrecognized error raised! Exception: (int) 42 (at LOCATION)",
            "Test 'message' failed! Unrecognized error raised! Exception: plain panic (at LOCATION)",
            "Test 'unhandled_error' failed! Unrecognized error raised! Exception: quota exceeded: 3 > 1",
            "Test 'described' failed! Error: Expected 12°C to be equal 30°C, Celsius(12) != Celsius(30), on line N!",
            "Test 'passes' successful!",
        ],
    );
    check_summary(&output, "Executed 7 tests, 6 failed, 1 succeeded.");

    let location = output
        .result_lines()
        .into_iter()
        .find(|line| line.starts_with("Test 'integer'"))
        .expect("integer line is present");
    assert!(
        location.contains("handler-suite.rs:"),
        "panic location names the suite source: {location}"
    );
}

#[test]
fn test_control_defaults() {
    let start = Instant::now();
    let output = control_suite().arg("--no-time").unchecked(true).output();
    let elapsed = start.elapsed();

    check_results(
        &output,
        &[
            "Test 'flaky' successful!",
            "Test 'slow' failed! Error: Timed out after 300ms (SIGALRM)!",
            "Test 'sleepy' successful!",
            "Test 'skipped' skipped!",
            "Test 'passes' successful!",
        ],
    );
    check_summary(&output, "Executed 5 tests, 1 failed, 4 succeeded.");

    // The slow test sleeps for 5 seconds; the timeout has to cut it short.
    assert!(
        elapsed < Duration::from_secs(4),
        "run took {elapsed:?}:\n{output}"
    );
}

#[test]
fn test_repeat() {
    let output = control_suite()
        .args(["--no-time", "--repeat", "3"])
        .unchecked(true)
        .output();

    check_results(
        &output,
        &[
            "Test 'flaky' failed! Error: failed on repetition 2, on line N!",
            "Test 'slow' failed! Error: Timed out after 300ms (SIGALRM)!",
            "Test 'sleepy' successful!",
            "Test 'skipped' skipped!",
            "Test 'passes' successful!",
        ],
    );
    check_summary(&output, "Executed 5 tests, 2 failed, 3 succeeded.");

    let env_output = control_suite()
        .arg("--no-time")
        .env("BULWARK_REPEAT", "3")
        .unchecked(true)
        .output();
    assert_eq!(env_output.stdout_as_str(), output.stdout_as_str());
}

#[test]
fn test_default_timeout() {
    let output = control_suite()
        .args(["--no-time", "--timeout", "20ms"])
        .unchecked(true)
        .output();

    check_results(
        &output,
        &[
            "Test 'flaky' successful!",
            // An explicit timeout in the body replaces the default one.
            "Test 'slow' failed! Error: Timed out after 300ms (SIGALRM)!",
            "Test 'sleepy' failed! Error: Timed out after 20ms (SIGALRM)!",
            "Test 'skipped' skipped!",
            "Test 'passes' successful!",
        ],
    );
}

#[test]
fn test_fail_fast() {
    let output = control_suite()
        .args(["--no-time", "--fail-fast"])
        .unchecked(true)
        .output();

    check_results(
        &output,
        &[
            "Test 'flaky' successful!",
            "Test 'slow' failed! Error: Timed out after 300ms (SIGALRM)!",
        ],
    );
    check_summary(&output, "Executed 2 tests, 1 failed, 1 succeeded.");
    check_exit_code(&output, HarnessExitCode::TEST_RUN_FAILED);
    assert!(
        output
            .stderr_as_str()
            .contains("stopping after the first failure, 3 tests not run"),
        "fail-fast is logged:\n{output}"
    );

    let output = control_suite()
        .args(["--no-time", "--fail-fast", "--no-fail-fast"])
        .unchecked(true)
        .output();
    check_summary(&output, "Executed 5 tests, 1 failed, 4 succeeded.");
}

#[test]
fn test_output_options() {
    let output = control_suite()
        .args(["--hide-success", "--show-skip-reason"])
        .unchecked(true)
        .output();

    check_results(
        &output,
        &[
            "Test 'slow' failed! Error: Timed out after 300ms (SIGALRM)!",
            "Test 'skipped' skipped! Reason: needs a GPU",
        ],
    );
    let summary = output.summary_line().expect("summary is printed");
    assert!(has_run_time(&summary), "summary has the run time: {summary}");
}

#[test]
fn test_runs_are_repeatable() {
    let first = signal_suite().arg("--no-time").unchecked(true).output();
    let second = signal_suite().arg("--no-time").unchecked(true).output();

    // Fault addresses on the stack move between runs.
    let normalized = |output: &integration_tests::suite_cli::SuiteOutput| {
        output
            .result_lines()
            .iter()
            .map(|line| normalize(line))
            .collect::<Vec<_>>()
    };
    assert_eq!(normalized(&first), normalized(&second));
    assert_eq!(first.summary_line(), second.summary_line());
    assert_eq!(first.exit_status.code(), second.exit_status.code());
}

#[test]
fn test_exit_code_policies() {
    let output = signal_suite()
        .args(["--no-time", "--exit-code", "failure-count"])
        .unchecked(true)
        .output();
    check_exit_code(&output, 15);

    let output = signal_suite()
        .args(["--no-time", "--exit-code", "always-zero"])
        .output();
    check_summary(&output, "Executed 26 tests, 15 failed, 11 succeeded.");

    let output = clean_suite()
        .args(["--no-time", "--exit-code", "failure-count"])
        .output();
    check_exit_code(&output, HarnessExitCode::OK);
}

const QUIET_CONFIG: &str = r#"
[run]
exit-code = "failure-count"

[report]
print-success = false
print-time = false
"#;

#[test]
fn test_config_file() {
    let temp_dir = Utf8TempDir::new().expect("created temp dir");
    let config_path = temp_dir.path().join("bulwark.toml");
    std::fs::write(&config_path, QUIET_CONFIG).expect("wrote config");

    let expected = [
        "Test 'slow' failed! Error: Timed out after 300ms (SIGALRM)!",
        "Test 'skipped' skipped!",
    ];

    // Discovered from the current directory.
    let output = control_suite()
        .current_dir(temp_dir.path())
        .unchecked(true)
        .output();
    check_results(&output, &expected);
    check_summary(&output, "Executed 5 tests, 1 failed, 4 succeeded.");
    check_exit_code(&output, 1);

    // Passed explicitly.
    let output = control_suite()
        .args(["--config-file", config_path.as_str()])
        .unchecked(true)
        .output();
    check_results(&output, &expected);
    check_exit_code(&output, 1);

    // The command line takes precedence over the file.
    let output = control_suite()
        .args(["--config-file", config_path.as_str(), "--exit-code", "status"])
        .unchecked(true)
        .output();
    check_exit_code(&output, HarnessExitCode::TEST_RUN_FAILED);
}

#[test]
fn test_config_errors() {
    let temp_dir = Utf8TempDir::new().expect("created temp dir");

    let missing = temp_dir.path().join("missing.toml");
    let output = clean_suite()
        .args(["--config-file", missing.as_str()])
        .unchecked(true)
        .output();
    check_exit_code(&output, HarnessExitCode::SETUP_ERROR);
    assert!(
        output.stderr_as_str().contains("not found"),
        "missing config is reported:\n{output}"
    );
    assert!(output.result_lines().is_empty(), "no tests ran:\n{output}");

    let invalid = temp_dir.path().join("invalid.toml");
    std::fs::write(&invalid, "[run]\nrepeat = \"often\"\n").expect("wrote config");
    let output = clean_suite()
        .args(["--config-file", invalid.as_str()])
        .unchecked(true)
        .output();
    check_exit_code(&output, HarnessExitCode::SETUP_ERROR);
    assert!(
        output.stderr_as_str().contains("failed to parse config file"),
        "parse error is reported:\n{output}"
    );

    let unknown = temp_dir.path().join("unknown.toml");
    std::fs::write(&unknown, "[run]\nretries = 3\n").expect("wrote config");
    let output = clean_suite()
        .args(["--config-file", unknown.as_str(), "--no-time"])
        .output();
    check_summary(&output, "Executed 5 tests, 0 failed, 5 succeeded.");
    assert!(
        output.stderr_as_str().contains("ignoring unknown config keys"),
        "unknown keys are warned about:\n{output}"
    );
}
