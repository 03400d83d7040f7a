//! Error types and error handling strategy for Crossexec.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - An error raised inside one context never crosses into another context
//!   as-is; it is first captured into a [`PortableError`](crate::PortableError)
//!   and rehydrated on the other side
//! - Panics inside work unit phases are caught and converted to
//!   [`ErrorKind::Generic`] errors carrying the panic message
//! - A rejection looks the same at the call site whatever its cause; only the
//!   kind and message differ
//!
//! # Error Categories
//!
//! - **Argument**: bad call arguments or references, detected before execution
//! - **Execution**: failures raised by user code while executing
//! - **Lifecycle**: the target (or the caller) is gone or going away
//! - **Dispatch**: the call shape itself is not serviceable
//! - **Internal**: engine bugs and invalid states

use core::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::ContextId;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // === Argument ===
    /// Bad call arguments, detected before the prepare phase.
    Validation,
    /// A value had the wrong type.
    TypeMismatch,
    /// A value was outside its permitted range.
    Range,
    /// A remote reference was used outside its owning context, or is stale.
    InvalidReference,

    // === Execution ===
    /// Uncategorized execute-phase failure.
    Generic,

    // === Lifecycle ===
    /// The target context vanished before or during scheduling.
    ContextDisposed,
    /// `dispose()` was called on an already disposed handle.
    AlreadyDisposed,
    /// The context is tearing down irrecoverably.
    ///
    /// During finalize this is swallowed rather than delivered, since the
    /// requester may no longer be valid.
    FatalTermination,

    // === Dispatch ===
    /// A synchronous call into a non-default context was made from a thread
    /// that is itself servicing an asynchronous call.
    DisallowedNestedSyncCall,

    // === Internal ===
    /// Internal engine error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation | Self::TypeMismatch | Self::Range | Self::InvalidReference => {
                ErrorCategory::Argument
            }
            Self::Generic => ErrorCategory::Execution,
            Self::ContextDisposed | Self::AlreadyDisposed | Self::FatalTermination => {
                ErrorCategory::Lifecycle
            }
            Self::DisallowedNestedSyncCall => ErrorCategory::Dispatch,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the conventional error name shown to script-facing callers.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TypeMismatch => "TypeError",
            Self::Range => "RangeError",
            _ => "Error",
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Argument and reference failures.
    Argument,
    /// Failures raised by executing code.
    Execution,
    /// Context lifecycle failures.
    Lifecycle,
    /// Call-shape failures.
    Dispatch,
    /// Internal engine errors.
    Internal,
}

/// The main error type for Crossexec operations.
///
/// Besides kind and message, an error carries the context it was raised in
/// (if any) and a short stack of frame descriptions. Frames from the context
/// where the failure happened come first; frames chained by the receiving
/// side follow.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    origin: Option<ContextId>,
    stack: SmallVec<[String; 2]>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            origin: None,
            stack: SmallVec::new(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Records the context the error belongs to.
    #[must_use]
    pub const fn with_origin(mut self, origin: ContextId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Appends a frame description to the stack.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the context the error belongs to, if known.
    #[must_use]
    pub const fn origin(&self) -> Option<ContextId> {
        self.origin
    }

    /// Returns the recorded stack frames, innermost first.
    #[must_use]
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Returns true if this error reports a disposed context.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ContextDisposed | ErrorKind::AlreadyDisposed
        )
    }

    /// Returns true if the context is terminating irrecoverably.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::FatalTermination)
    }

    /// Sets the stack to the given frames when the error has none yet.
    ///
    /// Used for errors created on the receiving side (disposal rejections,
    /// finalize failures), whose only meaningful stack is the caller's.
    pub(crate) fn attach_stack<I>(&mut self, frames: I)
    where
        I: IntoIterator<Item = String>,
    {
        if self.stack.is_empty() {
            self.stack.extend(frames);
        }
    }

    /// Appends the given frames after the existing ones.
    ///
    /// Used when rehydrating a remote failure: the remote frames stay on top
    /// and the caller's frames show where the call was made from.
    pub(crate) fn chain_stack<I>(&mut self, frames: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.stack.extend(frames);
    }

    /// Keeps at most `max` frames, dropping the outermost ones.
    pub(crate) fn truncate_stack(&mut self, max: usize) {
        self.stack.truncate(max);
    }

    pub(crate) fn set_origin(&mut self, origin: ContextId) {
        self.origin = Some(origin);
    }

    pub(crate) fn into_parts(self) -> (ErrorKind, Option<String>, SmallVec<[String; 2]>) {
        let message = match (self.message, self.source) {
            (Some(msg), Some(src)) => Some(format!("{msg}: {src}")),
            (Some(msg), None) => Some(msg),
            (None, Some(src)) => Some(src.to_string()),
            (None, None) => None,
        };
        (self.kind, message, self.stack)
    }

    /// Creates a validation error (bad call arguments).
    #[must_use]
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation).with_message(detail)
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch).with_message(detail)
    }

    /// Creates a range error.
    #[must_use]
    pub fn range(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range).with_message(detail)
    }

    /// Creates an uncategorized runtime error.
    #[must_use]
    pub fn generic(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic).with_message(detail)
    }

    /// Creates the "context is disposed" error.
    #[must_use]
    pub fn context_disposed() -> Self {
        Self::new(ErrorKind::ContextDisposed).with_message("context is disposed")
    }

    /// Creates the "context is already disposed" error.
    #[must_use]
    pub fn already_disposed() -> Self {
        Self::new(ErrorKind::AlreadyDisposed).with_message("context is already disposed")
    }

    /// Creates the error for a synchronous call that cannot be serviced
    /// without risking deadlock.
    #[must_use]
    pub fn disallowed_nested_sync_call() -> Self {
        Self::new(ErrorKind::DisallowedNestedSyncCall).with_message(
            "calling a synchronous function on a non-default context from within an \
             asynchronous call is not allowed",
        )
    }

    /// Creates a fatal termination error.
    #[must_use]
    pub fn fatal_termination() -> Self {
        Self::new(ErrorKind::FatalTermination).with_message("context is terminating")
    }

    /// Creates an internal error (engine bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Formats a call site as a stack frame.
#[must_use]
pub fn frame_for(location: &Location<'_>) -> String {
    format!(
        "at {}:{}:{}",
        location.file(),
        location.line(),
        location.column()
    )
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }
}

/// A specialized Result type for Crossexec operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
