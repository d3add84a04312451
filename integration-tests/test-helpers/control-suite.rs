// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests whose results depend on the run settings: repetition, timeouts and
//! skipping.

use bulwark::{fail, registry::Registry};
use std::time::Duration;

fn main() {
    let mut registry = Registry::new();

    registry
        .test("flaky", |cx| {
            if cx.repetition() == 2 {
                fail!("failed on repetition {}", cx.repetition());
            }
        })
        .test("slow", |cx| {
            cx.set_timeout(Duration::from_millis(300));
            std::thread::sleep(Duration::from_secs(5));
        })
        .test("sleepy", |_| {
            std::thread::sleep(Duration::from_millis(100));
        })
        .test("skipped", |cx| {
            cx.skip("needs a GPU");
        })
        .test("passes", |_| {});

    bulwark::run_main(registry);
}
