// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! A test harness that keeps running when the code under test crashes.
//!
//! Tests are registered in a [`Registry`](registry::Registry) and run in
//! order by a [`TestRunner`](runner::TestRunner). Each test runs behind a
//! [checkpoint](checkpoint): if it raises a fatal signal (an illegal memory
//! access, an abort, a floating-point trap, a timeout...), the signal trap
//! fires the checkpoint, the test is reported as failed, and the run carries
//! on with the next test.
//!
//! A minimal suite looks like:
//!
//! ```no_run
//! use bulwark::{check_eq, registry::Registry};
//!
//! fn main() {
//!     let mut registry = Registry::new();
//!     registry.test("addition", |_| {
//!         check_eq!(1 + 1, 2);
//!     });
//!     bulwark::run_main(registry);
//! }
//! ```

#[cfg(not(unix))]
compile_error!("bulwark requires a Unix-like target");

pub mod assert;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod context;
mod debugger;
pub mod describe;
pub mod dispatch;
pub mod errors;
pub mod exit_codes;
pub mod outcome;
pub mod output;
pub mod registry;
pub mod reporter;
pub mod runner;
mod sandbox;
pub mod signal;
mod stopwatch;
pub mod trap;

pub use dispatch::run_main;
