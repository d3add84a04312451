// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translation handlers turning foreign errors into test failures.

use bulwark::{
    check_eq, describe::Describe, fail, outcome::TestFailure, registry::Registry,
};
use std::{io, panic};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("quota exceeded: {used} > {limit}")]
struct QuotaError {
    used: u32,
    limit: u32,
}

#[derive(Debug, PartialEq)]
struct Celsius(i32);

impl Describe for Celsius {
    fn describe(&self) -> String {
        format!("{}°C", self.0)
    }
}

fn main() {
    let mut registry = Registry::new();

    registry
        // A broken handler is skipped; the ones after it still run.
        .handler(|_| panic!("this handler is broken"))
        .handler(|handle| {
            handle
                .error_downcast_ref::<io::Error>()
                .map(|error| TestFailure::new(format!("I/O error: {error}")))
        })
        .handler(|handle| {
            if let Some(error) = handle.downcast_ref::<QuotaError>() {
                fail!("{error}");
            }
            None
        });

    registry
        .fallible("io_error", |_| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "config.toml"))
        })
        .test("quota", |_| {
            panic::panic_any(QuotaError {
                used: 12,
                limit: 10,
            })
        })
        .test("integer", |_| panic::panic_any(42i32))
        .test("message", |_| panic!("plain panic"))
        .fallible("unhandled_error", |_| -> Result<(), QuotaError> {
            Err(QuotaError { used: 3, limit: 1 })
        })
        .test("described", |_| {
            check_eq!(Celsius(12), Celsius(30));
        })
        .test("passes", |_| {});

    bulwark::run_main(registry);
}
