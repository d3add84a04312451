// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The checkpoint-process side of running one test unit.

use crate::{
    classify::{self, TranslationHandler},
    context::TestContext,
    debugger,
    errors::TrapError,
    outcome::{Outcome, SkipRequest, TestFailure},
    registry::TestUnit,
    trap,
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tracing::warn;

/// Settings applied to every invocation of a unit.
#[derive(Clone, Copy, Debug)]
pub(crate) struct UnitSettings {
    pub(crate) repeat: u32,
    pub(crate) timeout: Option<Duration>,
    pub(crate) break_on_failure: bool,
}

static LAST_PANIC_LOCATION: Mutex<Option<String>> = Mutex::new(None);

/// Runs every repetition of `unit` and classifies the result.
///
/// Called inside the unit's checkpoint process, so the trap and panic hook
/// installed here never affect the scheduler.
pub(crate) fn run_unit(
    unit: &TestUnit,
    index: usize,
    handlers: &[TranslationHandler],
    settings: UnitSettings,
) -> Outcome {
    if let Err(error) = trap::install() {
        // Signals still end the checkpoint process; they're reported as kills.
        warn!("test `{}` runs without the signal trap: {error}", unit.name());
    }
    trap::set_current_test(index);
    install_panic_hook();
    debugger::set_break_on_failure(settings.break_on_failure);

    let outcome = run_repetitions(unit, handlers, settings);

    if let Err(error) = trap::set_timeout(Duration::ZERO) {
        warn!("failed to disarm timeout after test `{}`: {error}", unit.name());
    }
    outcome
}

fn run_repetitions(
    unit: &TestUnit,
    handlers: &[TranslationHandler],
    settings: UnitSettings,
) -> Outcome {
    for repetition in 0..settings.repeat {
        if let Err(error) = prepare_invocation(settings.timeout) {
            return Outcome::Failure(TestFailure::new(format!(
                "Could not prepare invocation: {error}!"
            )));
        }

        let cx = TestContext::new(unit.name(), repetition, handlers);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| unit.invoke(&cx))) {
            let location = take_panic_location();
            return classify::classify(&*payload, handlers, location.as_deref());
        }
    }
    Outcome::Success
}

fn prepare_invocation(timeout: Option<Duration>) -> Result<(), TrapError> {
    take_panic_location();
    trap::reset_for_invocation()?;
    match timeout {
        Some(timeout) => trap::set_timeout(timeout),
        None => Ok(()),
    }
}

/// Replaces the panic hook with one that records where foreign panics were
/// raised and prints nothing.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let payload = info.payload();
        if payload.is::<TestFailure>() || payload.is::<SkipRequest>() {
            return;
        }
        if let Some(location) = info.location() {
            *LAST_PANIC_LOCATION
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(location.to_string());
        }
    }));
}

/// Takes the location of the most recent foreign panic, if any.
pub(crate) fn take_panic_location() -> Option<String> {
    LAST_PANIC_LOCATION
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}
