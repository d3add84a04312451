// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning raised errors into outcomes.
//!
//! A test body raises an error by panicking. [`classify`] converts the panic
//! payload into an [`Outcome`]: harness payloads (failures, skips) first, then
//! every registered [`TranslationHandler`] in order, and finally a best-effort
//! diagnostic for payloads nobody recognized.

use crate::outcome::{Outcome, SkipRequest, TestFailure};
use std::{
    any::Any,
    error::Error,
    panic::{self, AssertUnwindSafe},
};
use tracing::debug;

/// A user-registered handler that converts foreign errors into failures.
///
/// A handler converts an error by returning `Some(failure)` or by raising a
/// failure itself (for example with [`fail!`](crate::fail)). It rejects an
/// error by returning `None`; raising anything else also counts as a
/// rejection.
pub type TranslationHandler = Box<dyn Fn(&ErrorHandle<'_>) -> Option<TestFailure>>;

/// An opaque view of an error raised by a test body.
#[derive(Clone, Copy)]
pub struct ErrorHandle<'a> {
    payload: &'a (dyn Any + Send),
}

impl<'a> ErrorHandle<'a> {
    pub(crate) fn new(payload: &'a (dyn Any + Send)) -> Self {
        Self { payload }
    }

    /// Returns the raised value if it has type `T`.
    ///
    /// This is the value passed to `std::panic::panic_any`, or the `&str` or
    /// `String` message of a plain `panic!`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        self.payload.downcast_ref::<T>()
    }

    /// Returns the error returned by a [fallible](crate::registry::Registry::fallible)
    /// test body, if that's what was raised.
    pub fn error(&self) -> Option<&'a (dyn Error + Send + Sync + 'static)> {
        self.payload
            .downcast_ref::<RaisedError>()
            .map(|raised| &*raised.0)
    }

    /// Returns the error returned by a fallible test body if it has type `E`.
    pub fn error_downcast_ref<E: Error + 'static>(&self) -> Option<&'a E> {
        self.error()?.downcast_ref::<E>()
    }

    /// Returns the panic message, for panics raised with a string.
    pub fn message(&self) -> Option<&'a str> {
        if let Some(message) = self.payload.downcast_ref::<&'static str>() {
            Some(message)
        } else {
            self.payload.downcast_ref::<String>().map(String::as_str)
        }
    }
}

/// The error returned by a fallible test body, raised as a panic payload.
pub(crate) struct RaisedError(pub(crate) Box<dyn Error + Send + Sync>);

/// An outcome classified inside a nested checkpoint, raised again in the
/// enclosing test so that it ends with the same outcome.
pub(crate) struct Reraised(pub(crate) Outcome);

/// Returns true for payloads the harness raises itself. These always pass
/// through `expect_panic` untouched.
pub(crate) fn is_intrinsic(payload: &(dyn Any + Send)) -> bool {
    payload.is::<TestFailure>() || payload.is::<SkipRequest>() || payload.is::<Reraised>()
}

/// Classifies a panic payload raised by a test body.
///
/// `location` is where the panic was raised, if it was captured; it is
/// appended to the diagnostic of unrecognized errors.
pub fn classify(
    payload: &(dyn Any + Send),
    handlers: &[TranslationHandler],
    location: Option<&str>,
) -> Outcome {
    if let Some(failure) = payload.downcast_ref::<TestFailure>() {
        return Outcome::Failure(failure.clone());
    }
    if let Some(skip) = payload.downcast_ref::<SkipRequest>() {
        return Outcome::Skipped(skip.reason.clone());
    }
    if let Some(Reraised(outcome)) = payload.downcast_ref::<Reraised>() {
        return outcome.clone();
    }

    let handle = ErrorHandle::new(payload);
    for (index, handler) in handlers.iter().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(&handle))) {
            Ok(Some(failure)) => return Outcome::Failure(failure),
            Ok(None) => {}
            Err(raised) => match raised.downcast::<TestFailure>() {
                Ok(failure) => return Outcome::Failure(*failure),
                Err(_) => {
                    debug!("translation handler {index} raised an unrelated error, skipping it")
                }
            },
        }
    }

    let diagnostic = diagnostic(payload);
    Outcome::UnrecognizedError(match location {
        Some(location) => format!("{diagnostic} (at {location})"),
        None => diagnostic,
    })
}

macro_rules! int_diagnostic {
    ($payload:expr, $($ty:ty),+) => {
        $(
            if let Some(code) = $payload.downcast_ref::<$ty>() {
                return format!("(int) {code}");
            }
        )+
    };
}

fn diagnostic(payload: &(dyn Any + Send)) -> String {
    let handle = ErrorHandle::new(payload);
    if let Some(message) = handle.message() {
        return message.to_owned();
    }
    if let Some(error) = handle.error() {
        let mut diagnostic = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            diagnostic.push_str(": ");
            diagnostic.push_str(&cause.to_string());
            source = cause.source();
        }
        return diagnostic;
    }
    int_diagnostic!(payload, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
    "unknown".to_owned()
}
