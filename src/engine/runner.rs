//! Phase runners.
//!
//! Each phase continuation is an explicit task type:
//!
//! - [`ExecuteRunner`] carries a prepared unit to the target. If it is
//!   dropped without running (the target went away), its `Drop` sends an
//!   orphan rejection back to the caller.
//! - [`FinalizeRunner`] carries the execute outcome back to the caller and
//!   settles the requester.
//! - [`IgnoredRunner`] executes and discards the outcome.
//! - [`SyncRunner`] executes on behalf of a caller blocked in an
//!   [`AsyncWait`](crate::runtime::wait::AsyncWait).

use crate::engine::callee::CalleeInfo;
use crate::engine::unit::{Dispatch, WorkUnit};
use crate::error::{Error, ErrorKind};
use crate::runtime::context::ContextStats;
use crate::runtime::wait::WaitSignal;
use crate::runtime::{Runnable, ScheduleOptions, Scope};
use crate::tracing_compat::{debug, trace, trace_span, warn};
use crate::types::portable::catch_phase;
use crate::types::{ContextId, PortableError};

/// Result of the execute phase, as delivered to the caller.
pub(crate) enum Outcome<U> {
    Success(Box<U>),
    Failure(PortableError),
    Orphaned,
}

impl<U> std::fmt::Debug for Outcome<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(_) => f.write_str("Success"),
            Self::Failure(err) => f.debug_tuple("Failure").field(err).finish(),
            Self::Orphaned => f.write_str("Orphaned"),
        }
    }
}

/// Captures an execute-phase failure for delivery to another context.
///
/// A fatal termination of the target is reported to the requester as an
/// ordinary disposal.
pub(crate) fn capture_execute_error(error: Error) -> PortableError {
    if error.is_fatal() {
        PortableError::new(
            ErrorKind::ContextDisposed,
            "context was terminated during execution",
        )
    } else {
        PortableError::capture(error)
    }
}

pub(crate) struct ExecuteRunner<U: WorkUnit> {
    unit: Option<Box<U>>,
    info: Option<CalleeInfo<U::Output>>,
    target: ContextId,
}

impl<U: WorkUnit> ExecuteRunner<U> {
    pub(crate) fn new(unit: Box<U>, info: CalleeInfo<U::Output>, target: ContextId) -> Self {
        Self {
            unit: Some(unit),
            info: Some(info),
            target,
        }
    }
}

impl<U: WorkUnit> Runnable for ExecuteRunner<U> {
    fn run(mut self: Box<Self>, scope: &Scope) {
        let (Some(mut unit), Some(info)) = (self.unit.take(), self.info.take()) else {
            return;
        };
        let _span = trace_span!("execute", context = %scope.context_id()).entered();
        let result = catch_phase(|| unit.execute(scope));
        ContextStats::bump(&scope.context().stats.executed);
        let outcome = match result {
            Ok(()) => Outcome::Success(unit),
            Err(err) => {
                trace!(context = %scope.context_id(), error = %err, "execute failed");
                Outcome::Failure(capture_execute_error(err))
            }
        };
        FinalizeRunner::schedule(info, outcome, self.target);
    }
}

impl<U: WorkUnit> Drop for ExecuteRunner<U> {
    fn drop(&mut self) {
        if let Some(info) = self.info.take() {
            debug!(target_context = %self.target, "execute runner dropped before running");
            drop(self.unit.take());
            FinalizeRunner::<U>::schedule(info, Outcome::Orphaned, self.target);
        }
    }
}

pub(crate) struct FinalizeRunner<U: WorkUnit> {
    info: CalleeInfo<U::Output>,
    outcome: Outcome<U>,
    target: ContextId,
}

impl<U: WorkUnit> FinalizeRunner<U> {
    /// Queues the finalize phase on the caller.
    ///
    /// If the caller is gone the runner is dropped, which abandons the
    /// requester.
    fn schedule(info: CalleeInfo<U::Output>, outcome: Outcome<U>, target: ContextId) {
        let Some(caller) = info.caller.upgrade() else {
            debug!(
                caller = %info.caller.id(),
                target = %target,
                "caller gone before finalize; requester abandoned"
            );
            return;
        };
        trace!(caller = %caller.id(), outcome = ?outcome, "scheduling finalize");
        caller.schedule(
            Box::new(Self {
                info,
                outcome,
                target,
            }),
            ScheduleOptions::default(),
        );
    }
}

impl<U: WorkUnit> Runnable for FinalizeRunner<U> {
    fn run(self: Box<Self>, scope: &Scope) {
        let Self {
            info,
            outcome,
            target,
        } = *self;
        let CalleeInfo {
            resolver,
            origin,
            async_token,
            ..
        } = info;
        let _span = trace_span!("finalize", context = %scope.context_id()).entered();
        let stats = &scope.context().stats;
        ContextStats::bump(&stats.finalized);
        match outcome {
            Outcome::Success(unit) => match catch_phase(|| unit.finalize(scope)) {
                Err(err) if err.is_fatal() => {
                    debug!(
                        context = %scope.context_id(),
                        "fatal termination during finalize; requester left unsettled"
                    );
                    drop(resolver);
                }
                result => resolver.settle(result.map_err(|err| origin.attach(err))),
            },
            Outcome::Failure(portable) => {
                resolver.reject(origin.chain(portable.rehydrate(Some(target))));
            }
            Outcome::Orphaned => {
                ContextStats::bump(&stats.orphaned);
                resolver.reject(origin.attach(Error::context_disposed().with_origin(target)));
            }
        }
        drop(async_token);
    }
}

pub(crate) struct IgnoredRunner<U: WorkUnit> {
    unit: Box<U>,
}

impl<U: WorkUnit> IgnoredRunner<U> {
    pub(crate) const fn new(unit: Box<U>) -> Self {
        Self { unit }
    }
}

impl<U: WorkUnit> Runnable for IgnoredRunner<U> {
    fn run(self: Box<Self>, scope: &Scope) {
        let mut unit = self.unit;
        let result = catch_phase(|| unit.execute(scope));
        ContextStats::bump(&scope.context().stats.executed);
        if let Err(err) = result {
            debug!(context = %scope.context_id(), error = %err, "ignored call failed");
        }
    }
}

pub(crate) struct SyncRunner<U: WorkUnit> {
    unit: Box<U>,
    signal: WaitSignal<Box<U>>,
    allow_async: bool,
}

impl<U: WorkUnit> SyncRunner<U> {
    pub(crate) const fn new(unit: Box<U>, signal: WaitSignal<Box<U>>, allow_async: bool) -> Self {
        Self {
            unit,
            signal,
            allow_async,
        }
    }
}

impl<U: WorkUnit> Runnable for SyncRunner<U> {
    fn run(self: Box<Self>, scope: &Scope) {
        let Self {
            mut unit,
            signal,
            allow_async,
        } = *self;
        let _span = trace_span!("execute_blocking", context = %scope.context_id()).entered();
        ContextStats::bump(&scope.context().stats.executed);
        if allow_async {
            let completion = signal.completion();
            match catch_phase(|| unit.execute_async(scope, completion)) {
                Ok(Dispatch::Done) => signal.finish(Some(unit), None, false),
                Ok(Dispatch::Deferred) => signal.finish(Some(unit), None, true),
                Err(err) => signal.finish(None, Some(PortableError::capture(err)), false),
            }
        } else {
            match catch_phase(|| unit.execute(scope)) {
                Ok(()) => signal.finish(Some(unit), None, false),
                Err(err) => {
                    if err.is_fatal() {
                        warn!(
                            context = %scope.context_id(),
                            "fatal termination during blocking call"
                        );
                    }
                    signal.finish(None, Some(PortableError::capture(err)), false);
                }
            }
        }
    }
}
