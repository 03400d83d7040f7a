//! Crossexec: a cross-context task execution engine.
//!
//! # Overview
//!
//! A *context* is an independent execution environment: it owns a heap of
//! values, a task queue, and at any instant exactly one thread may be running
//! inside it. Code running in one context asks another context to do work by
//! submitting a *work unit*, and gets the result (or an error) delivered back
//! without the two contexts ever touching each other's memory concurrently.
//!
//! Every work unit has three phases:
//!
//! ```text
//!   caller context              target context              caller context
//!  ┌──────────────┐  schedule  ┌──────────────┐  schedule  ┌──────────────┐
//!  │   prepare()  │ ─────────► │   execute()  │ ─────────► │  finalize()  │
//!  └──────────────┘            └──────────────┘            └──────────────┘
//!                                    │ dropped without running
//!                                    └──────────► "context is disposed" rejection
//! ```
//!
//! # Core Guarantees
//!
//! - **Exactly-once completion**: a submitted unit reaches exactly one terminal
//!   outcome, even when the target is disposed concurrently
//! - **No deadlock on nesting**: calls made while already inside (or already
//!   holding) the target run in place
//! - **Portable failures**: execute-phase errors and panics are captured into a
//!   [`PortableError`] before they cross a context boundary
//! - **Explicit context**: there is no ambient "current context"; every phase
//!   receives the [`Scope`] it runs in
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, portable errors, remote references
//! - [`runtime`]: contexts, handles, schedulers, execution locks, waits, completions
//! - [`engine`]: the three-phase orchestration and synchronous dispatch
//! - [`error`](mod@error): error types
//! - [`tracing_compat`]: optional tracing integration (requires `tracing-integration` feature)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod engine;
pub mod error;
pub mod runtime;
pub mod tracing_compat;
pub mod types;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use engine::{
    CopyOut, Dispatch, FnUnit, Invocation, Invoke, RunMode, WorkUnit, run, run_async,
    run_async_with, run_ignored, run_sync, run_sync_await,
};
pub use error::{Error, ErrorCategory, ErrorKind, Result, ResultExt};
pub use runtime::{
    AsyncCompletion, CompletionState, ConfigError, ContextConfig, ContextDriver, ContextHandle,
    ContextKind, ContextState, Pending, Resolver, Runnable, ScheduleOptions, Scope,
    StatsSnapshot, task_fn,
};
pub use types::{ContextId, PortableError, RemoteRefError, RemoteReference};
