//! Context-independent error representation.
//!
//! An [`Error`] raised inside a context may reference state owned by that
//! context (its source chain, its origin tag). Before a failure crosses a
//! context boundary it is captured into a [`PortableError`], which holds only
//! owned plain data, and rehydrated into a fresh [`Error`] on the receiving
//! side.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::types::ContextId;

/// A failure captured in one context, to be delivered in another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableError {
    kind: ErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stack: Vec<String>,
}

impl PortableError {
    /// Creates a portable error from its parts.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Captures an error, flattening its source chain into the message.
    #[must_use]
    pub fn capture(error: Error) -> Self {
        let (kind, message, stack) = error.into_parts();
        Self {
            kind,
            message: message.unwrap_or_default(),
            stack: stack.into_vec(),
        }
    }

    /// Captures a panic payload as a generic runtime failure.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(ErrorKind::Generic, panic_message(payload))
    }

    /// The rejection delivered for a unit whose target went away.
    #[must_use]
    pub fn disposed() -> Self {
        Self::capture(Error::context_disposed())
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the captured stack frames.
    #[must_use]
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Returns true if this failure must not be delivered to the requester.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::FatalTermination)
    }

    /// Builds a fresh [`Error`] in the receiving context.
    ///
    /// `origin` is the context where the failure happened.
    #[must_use]
    pub fn rehydrate(self, origin: Option<ContextId>) -> Error {
        let mut error = Error::new(self.kind);
        if !self.message.is_empty() {
            error = error.with_message(self.message);
        }
        error.chain_stack(self.stack);
        if let Some(origin) = origin {
            error.set_origin(origin);
        }
        error
    }
}

impl From<Error> for PortableError {
    fn from(error: Error) -> Self {
        Self::capture(error)
    }
}

/// Extracts a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one phase of a work unit, converting a panic into a generic error.
pub(crate) fn catch_phase<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PortableError::from_panic(payload.as_ref()).rehydrate(None)),
    }
}
