// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A suite in which every test passes.

use bulwark::{check, check_eq, check_ne, registry::Registry, signal::TrapSignal};
use std::collections::BTreeMap;

fn main() {
    let mut registry = Registry::new();

    registry
        .test("arithmetic", |_| {
            check_eq!(2i32 + 2, 4i32);
            check_ne!(2i32 * 3, 5i32);
        })
        .test("strings", |_| {
            let greeting = format!("hello, {}", "world");
            check!(greeting.starts_with("hello"));
            check_eq!(greeting.len(), 12usize);
        })
        .test("collections", |_| {
            let mut map = BTreeMap::new();
            map.insert("b", 2u32);
            map.insert("a", 1u32);
            let keys: Vec<_> = map.keys().copied().collect();
            check_eq!(keys, vec!["a", "b"]);
        })
        .test("expected_abort", |cx| {
            cx.expect_signal(TrapSignal::Abrt, || std::process::abort());
        })
        .test("repetition_numbers", |cx| {
            check!(cx.repetition() < 16, "too many repetitions");
        });

    bulwark::run_main(registry);
}
