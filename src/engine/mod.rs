//! Three-phase orchestration.
//!
//! Entry points take the caller's [`Scope`], a handle to the target, and a
//! [`WorkUnit`]. `prepare` always runs first, in the caller, and its
//! failure is returned directly. What happens next depends on the mode:
//!
//! | Mode | Returns | Execute | Finalize |
//! |------|---------|---------|----------|
//! | [`RunMode::Sync`] | the value | see [`sync`] strategies | in place |
//! | [`RunMode::SyncAwait`] | the value | blocking wait only; may defer | in place |
//! | [`RunMode::Async`] | a [`Pending`] | queued on the target | queued on the caller |
//! | [`RunMode::Ignored`] | nothing | queued on the target | never |
//!
//! Asynchronous calls settle their [`Pending`] exactly once: with the
//! finalized value, with the rehydrated execute or finalize error, or with
//! a "context is disposed" rejection when the target never ran the unit.
//! The single exception is a fatal termination raised while finalizing,
//! which leaves the requester abandoned.
//!
//! All entry points are `#[track_caller]`: the call site is recorded as the
//! origin frame of delivered errors.

pub(crate) mod callee;
pub(crate) mod runner;
pub mod sync;
pub mod unit;

pub use unit::{CopyOut, Dispatch, FnUnit, Invoke, WorkUnit};

use crate::error::{Error, Result};
use crate::runtime::completion::channel;
use crate::runtime::{ContextHandle, Pending, ScheduleOptions, Scope};
use crate::types::portable::catch_phase;
use callee::{CalleeInfo, Origin};
use runner::{ExecuteRunner, IgnoredRunner};
use std::panic::Location;

/// How a call waits for its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Block until the result is available.
    Sync,
    /// Block until the result is available, allowing the execute phase to
    /// complete asynchronously. Only serviceable by a default context.
    SyncAwait,
    /// Return a [`Pending`] immediately.
    Async,
    /// Execute and discard the outcome.
    Ignored,
}

/// The result of [`run`].
#[derive(Debug)]
pub enum Invocation<T> {
    /// A synchronous call's value.
    Ready(T),
    /// An asynchronous call's completion.
    Pending(Pending<T>),
    /// An ignored call.
    Ignored,
}

impl<T> Invocation<T> {
    /// Returns the value of a synchronous call.
    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the completion of an asynchronous call.
    pub fn into_pending(self) -> Option<Pending<T>> {
        match self {
            Self::Pending(pending) => Some(pending),
            _ => None,
        }
    }
}

fn prepare<U: WorkUnit>(scope: &Scope, unit: U, origin: &Origin) -> Result<Box<U>> {
    let mut unit = Box::new(unit);
    catch_phase(|| unit.prepare(scope)).map_err(|err| origin.attach(err))?;
    Ok(unit)
}

/// Runs `unit` against `target` in the given mode.
#[track_caller]
pub fn run<U: WorkUnit>(
    mode: RunMode,
    scope: &Scope,
    target: &ContextHandle,
    unit: U,
) -> Result<Invocation<U::Output>> {
    match mode {
        RunMode::Sync => run_sync(scope, target, unit).map(Invocation::Ready),
        RunMode::SyncAwait => run_sync_await(scope, target, unit).map(Invocation::Ready),
        RunMode::Async => run_async(scope, target, unit).map(Invocation::Pending),
        RunMode::Ignored => run_ignored(scope, target, unit).map(|()| Invocation::Ignored),
    }
}

/// Runs `unit` synchronously and returns its finalized value.
#[track_caller]
pub fn run_sync<U: WorkUnit>(scope: &Scope, target: &ContextHandle, unit: U) -> Result<U::Output> {
    let origin = Origin::capture(scope, Location::caller());
    let unit = prepare(scope, unit, &origin)?;
    sync::dispatch(scope, target, unit, false, &origin)
}

/// Runs `unit` synchronously, letting its execute phase complete
/// asynchronously through [`WorkUnit::execute_async`].
///
/// The target must be a default context and the caller must not be on the
/// default thread.
#[track_caller]
pub fn run_sync_await<U: WorkUnit>(
    scope: &Scope,
    target: &ContextHandle,
    unit: U,
) -> Result<U::Output> {
    let origin = Origin::capture(scope, Location::caller());
    let unit = prepare(scope, unit, &origin)?;
    sync::dispatch(scope, target, unit, true, &origin)
}

/// Runs `unit` asynchronously; the returned [`Pending`] settles once the
/// caller's context has run the finalize phase.
#[track_caller]
pub fn run_async<U: WorkUnit>(
    scope: &Scope,
    target: &ContextHandle,
    unit: U,
) -> Result<Pending<U::Output>> {
    run_async_with(scope, target, unit, ScheduleOptions::default())
}

/// [`run_async`] with explicit scheduling options for the execute phase.
///
/// With `run_inline`, a call into the caller's own context executes before
/// this function returns. Finalize is always queued.
#[track_caller]
pub fn run_async_with<U: WorkUnit>(
    scope: &Scope,
    target: &ContextHandle,
    unit: U,
    options: ScheduleOptions,
) -> Result<Pending<U::Output>> {
    let origin = Origin::capture(scope, Location::caller());
    let unit = prepare(scope, unit, &origin)?;
    let Some(caller) = scope.handle() else {
        return Err(origin.attach(Error::context_disposed()));
    };
    let (resolver, pending) = channel();
    let info = CalleeInfo::new(scope, caller.downgrade(), resolver, origin);
    let runner = ExecuteRunner::new(unit, info, target.id());
    target.schedule_in(scope, Box::new(runner), options);
    Ok(pending)
}

/// Runs `unit`'s execute phase in `target` and discards the outcome.
#[track_caller]
pub fn run_ignored<U: WorkUnit>(scope: &Scope, target: &ContextHandle, unit: U) -> Result<()> {
    let origin = Origin::capture(scope, Location::caller());
    let unit = prepare(scope, unit, &origin)?;
    target.schedule(Box::new(IgnoredRunner::new(unit)), ScheduleOptions::default());
    Ok(())
}
