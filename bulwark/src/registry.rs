// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registering tests and translation handlers.

use crate::{
    classify::{ErrorHandle, RaisedError, TranslationHandler},
    context::TestContext,
    outcome::TestFailure,
};
use std::{error::Error, fmt, panic};

type TestBody = Box<dyn Fn(&TestContext<'_>)>;

/// One named test body.
pub struct TestUnit {
    name: String,
    body: TestBody,
}

impl TestUnit {
    /// The name the test was registered with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, cx: &TestContext<'_>) {
        (self.body)(cx)
    }
}

impl fmt::Debug for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUnit")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The ordered set of tests and translation handlers for one suite.
///
/// Tests run in registration order. Handlers are consulted in registration
/// order.
#[derive(Default)]
pub struct Registry {
    tests: Vec<TestUnit>,
    handlers: Vec<TranslationHandler>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a test body.
    pub fn test<F>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&TestContext<'_>) + 'static,
    {
        self.tests.push(TestUnit {
            name: name.into(),
            body: Box::new(body),
        });
        self
    }

    /// Registers a test body that returns a `Result`.
    ///
    /// An `Err` is raised as an error: translation handlers see it through
    /// [`ErrorHandle::error`], and if none converts it the test fails as an
    /// unrecognized error showing the error's message.
    pub fn fallible<F, E>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&TestContext<'_>) -> Result<(), E> + 'static,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.test(name, move |cx| {
            if let Err(error) = body(cx) {
                panic::resume_unwind(Box::new(RaisedError(error.into())));
            }
        })
    }

    /// Registers a translation handler.
    pub fn handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ErrorHandle<'_>) -> Option<TestFailure> + 'static,
    {
        self.handlers.push(Box::new(handler));
        self
    }

    /// The registered tests, in order.
    pub fn tests(&self) -> &[TestUnit] {
        &self.tests
    }

    /// The registered translation handlers, in order.
    pub fn handlers(&self) -> &[TranslationHandler] {
        &self.handlers
    }

    /// The number of registered tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if no tests are registered.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tests", &self.tests)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
