// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A tour of the harness: most of these tests fail on purpose, in every way a
//! test can fail, and the run still reaches the last one.

use bulwark::{check, check_eq, fail, registry::Registry, signal::TrapSignal, skip};
use std::{io, panic, time::Duration};

fn segfault() {
    // SAFETY: nothing is mapped at this address; the write faults.
    unsafe { std::ptr::write_volatile(std::ptr::without_provenance_mut::<i32>(0x8), 42) };
}

#[derive(Debug, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

fn main() {
    let mut registry = Registry::new();

    registry.test("demo_check_eq", |_| {
        let v: Vec<i32> = vec![1, 2, 3, 4, 5, 6, 7, 8];

        check_eq!(v[0], 1);
        check_eq!(v[2], 3);
        check_eq!(v[3], 4);

        // Error: Expected 2 to be equal 4, v[1] != 4, on line N!
        check_eq!(v[1], 4);
    });

    registry.test("demo_fail", |_| {
        let oops = true;
        if oops {
            fail!("Oops");
        }
    });

    registry.test("demo_check", |_| {
        let a = 21;
        let b = 42;

        check!(a * 2 == b);
        check!(a == b / 2, "Joker");
        check!(a == b / 3, "Thief");
    });

    registry.test("demo_expect_panic", |cx| {
        cx.expect_panic(|| panic!("oh my!"));
        cx.expect_panic_of::<&str, _>(|| panic!("a plain message"));
        cx.expect_panic_of::<i32, _>(|| panic::panic_any(42i32));

        // Error: Expected panic of type std::io::error::Error, on line N!
        cx.expect_panic_of::<io::Error, _>(|| panic::panic_any(String::from("Oh no!")));
    });

    registry.test("demo_signal", |cx| {
        cx.set_timeout(Duration::from_secs(1));

        cx.expect_signal(TrapSignal::Segv, segfault);

        // Error: Timed out after 1s (SIGALRM)!
        std::thread::sleep(Duration::from_secs(2));
    });

    registry.test("demo_fault", |_| {
        // Error: Received SIGSEGV while trying to access: 0x8!
        segfault();
    });

    registry.test("demo_non_printable", |_| {
        check_eq!(Point { x: 1, y: 2 }, Point { x: 1, y: 3 });
    });

    registry.test("demo_skip", |_| {
        skip!("I don't feel like testing rn");
    });

    registry.fallible("demo_fallible", |_| -> io::Result<()> {
        Err(io::Error::other("disk on fire"))
    });

    registry.test("demo_final", |_| {
        // Nothing above took the run down with it.
    });

    bulwark::run_main(registry);
}
