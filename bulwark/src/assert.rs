// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assertion and control-flow macros for test bodies.
//!
//! Every failure reason produced here ends with `, on line N!`, where `N` is
//! the line of the macro invocation.

use crate::{
    debugger,
    outcome::{SkipRequest, TestFailure},
};
use std::panic;

/// Fails the current test with `reason`.
#[doc(hidden)]
pub fn raise_failure(reason: String) -> ! {
    debugger::break_if_requested();
    panic::panic_any(TestFailure::new(reason))
}

/// Skips the current test with `reason`.
#[doc(hidden)]
pub fn raise_skip(reason: String) -> ! {
    panic::panic_any(SkipRequest::new(reason))
}

/// Fails the current test with a formatted reason.
///
/// ```no_run
/// # fn body() {
/// bulwark::fail!("connection dropped after {} bytes", 12);
/// # }
/// ```
#[macro_export]
macro_rules! fail {
    ($($arg:tt)+) => {
        $crate::assert::raise_failure(::std::format!(
            "{}, on line {}!",
            ::std::format_args!($($arg)+),
            ::std::line!()
        ))
    };
}

/// Skips the current test with a formatted reason.
#[macro_export]
macro_rules! skip {
    ($($arg:tt)+) => {
        $crate::assert::raise_skip(::std::format!($($arg)+))
    };
}

/// Fails the current test unless `cond` holds.
///
/// Without a message, the reason names the condition:
/// `Expected <cond> to be true, but it was not, on line N!`.
#[macro_export]
macro_rules! check {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::fail!(
                "Expected {} to be true, but it was not",
                ::std::stringify!($cond)
            )
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fail!($($arg)+)
        }
    };
}

/// Fails the current test unless both sides compare equal.
///
/// The reason shows both values through [`to_printable!`](crate::to_printable)
/// followed by both expressions:
/// `Expected 2 to be equal 4, v[1] != 4, on line N!`.
#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    $crate::fail!(
                        "Expected {} to be equal {}, {} != {}",
                        $crate::to_printable!(left),
                        $crate::to_printable!(right),
                        ::std::stringify!($left),
                        ::std::stringify!($right)
                    )
                }
            }
        }
    };
}

/// Fails the current test if both sides compare equal.
#[macro_export]
macro_rules! check_ne {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if *left == *right {
                    $crate::fail!(
                        "Expected {} to not be equal {}, {} == {}",
                        $crate::to_printable!(left),
                        $crate::to_printable!(right),
                        ::std::stringify!($left),
                        ::std::stringify!($right)
                    )
                }
            }
        }
    };
}
