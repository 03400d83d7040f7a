//! Synchronous dispatch.
//!
//! A synchronous call blocks the caller until the unit has executed in the
//! target and been finalized in the caller. Four strategies are tried in
//! order; the first whose condition holds is used:
//!
//! 1. **Same context**: the caller is already inside the target. Execute
//!    runs in place, with no queue interaction.
//! 2. **Direct lock**: the caller is on the default thread, or already holds
//!    the target's execution lock. The target is locked (recursively if
//!    need be), its handle tasks are flushed, and execute runs on the
//!    calling thread. No blocking wait is involved.
//! 3. **Blocking wait**: the target is a default context. The caller parks
//!    in an [`AsyncWait`] with its own lock released while the target's
//!    thread executes the unit.
//! 4. Anything else could deadlock and is rejected with
//!    [`ErrorKind::DisallowedNestedSyncCall`](crate::ErrorKind::DisallowedNestedSyncCall).
//!
//! Calls that permit asynchronous completion can only be serviced by the
//! blocking wait; strategies 1 and 2 reject them.

use crate::engine::callee::Origin;
use crate::engine::runner::SyncRunner;
use crate::engine::unit::WorkUnit;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::context::{ContextKind, ContextStats};
use crate::runtime::wait::AsyncWait;
use crate::runtime::{ContextHandle, ScheduleOptions, Scope};
use crate::tracing_compat::trace;
use crate::types::PortableError;
use crate::types::portable::catch_phase;
use std::sync::Arc;

fn async_from_default_thread() -> Error {
    Error::new(ErrorKind::Validation)
        .with_message("this call may not be made from the default thread")
}

pub(crate) fn dispatch<U: WorkUnit>(
    scope: &Scope,
    target: &ContextHandle,
    mut unit: Box<U>,
    allow_async: bool,
    origin: &Origin,
) -> Result<U::Output> {
    let Some(context) = target.get_context() else {
        return Err(origin.attach(Error::context_disposed()));
    };
    let target_id = context.id();

    if scope.context_id() == target_id {
        trace!(context = %target_id, "sync call: same context");
        if allow_async {
            return Err(origin.attach(async_from_default_thread()));
        }
        if !context.is_active() {
            return Err(origin.attach(Error::context_disposed()));
        }
        ContextStats::bump(&context.stats.executed);
        catch_phase(|| unit.execute(scope)).map_err(|err| origin.chain(err))?;
        return finalize(unit, scope, origin);
    }

    if scope.is_default_thread() || context.executor.held_by_current_thread() {
        trace!(context = %target_id, "sync call: direct lock");
        if allow_async {
            return Err(origin.attach(async_from_default_thread()));
        }
        let executed = {
            let nested = scope.nested(Arc::clone(&context));
            if context.is_active() {
                context.flush_handle_tasks(&nested);
                ContextStats::bump(&context.stats.executed);
                catch_phase(|| unit.execute(&nested)).map_err(PortableError::capture)
            } else {
                Err(PortableError::disposed())
            }
        };
        return match executed {
            Ok(()) => finalize(unit, scope, origin),
            Err(portable) => Err(origin.chain(portable.rehydrate(Some(target_id)))),
        };
    }

    if context.kind() == ContextKind::Default {
        trace!(context = %target_id, "sync call: blocking wait");
        let (wait, signal) = AsyncWait::new();
        ContextStats::bump(&context.stats.async_waits);
        drop(context);
        target.schedule(
            Box::new(SyncRunner::new(unit, signal, allow_async)),
            ScheduleOptions::default(),
        );
        let (payload, error) = scope.suspend(|| wait.wait());
        return match (payload, error) {
            (_, Some(portable)) => Err(origin.chain(portable.rehydrate(Some(target_id)))),
            (Some(unit), None) => finalize(unit, scope, origin),
            (None, None) => Err(Error::internal("blocking call woke without an outcome")),
        };
    }

    Err(origin.attach(Error::disallowed_nested_sync_call()))
}

fn finalize<U: WorkUnit>(unit: Box<U>, scope: &Scope, origin: &Origin) -> Result<U::Output> {
    ContextStats::bump(&scope.context().stats.finalized);
    catch_phase(|| unit.finalize(scope)).map_err(|err| origin.attach(err))
}
