//! Bookkeeping that travels with a call from caller to target and back.

use crate::error::{Error, frame_for};
use crate::runtime::{Resolver, Scope, WeakContextHandle};
use crate::tracing_compat::trace;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ASYNC_ID: AtomicU64 = AtomicU64::new(1);

/// Where a call was made from, bounded by the caller's configuration.
#[derive(Debug, Clone)]
pub(crate) struct Origin {
    frames: Vec<String>,
    max_frames: usize,
}

impl Origin {
    pub(crate) fn capture(scope: &Scope, location: &'static Location<'static>) -> Self {
        let config = scope.config();
        let frames = if config.capture_origin {
            vec![frame_for(location)]
        } else {
            Vec::new()
        };
        Self {
            frames,
            max_frames: config.max_stack_frames,
        }
    }

    /// For errors created on the caller's side: the call site is the stack.
    pub(crate) fn attach(&self, mut error: Error) -> Error {
        error.attach_stack(self.frames.iter().cloned());
        error.truncate_stack(self.max_frames);
        error
    }

    /// For errors raised remotely: the call site follows the remote frames.
    pub(crate) fn chain(&self, mut error: Error) -> Error {
        error.chain_stack(self.frames.iter().cloned());
        error.truncate_stack(self.max_frames);
        error
    }
}

/// Marks an asynchronous call issued from a default context for the whole
/// of its lifetime, so traces can pair its start and end.
#[derive(Debug)]
pub(crate) struct AsyncToken {
    id: u64,
}

impl AsyncToken {
    pub(crate) fn new() -> Self {
        let id = NEXT_ASYNC_ID.fetch_add(1, Ordering::Relaxed);
        trace!(async_id = id, "async call init");
        Self { id }
    }
}

impl Drop for AsyncToken {
    fn drop(&mut self) {
        trace!(async_id = self.id, "async call destroy");
    }
}

/// Everything the finalize phase needs to settle the requester.
pub(crate) struct CalleeInfo<T> {
    pub(crate) resolver: Resolver<T>,
    pub(crate) caller: WeakContextHandle,
    pub(crate) origin: Origin,
    pub(crate) async_token: Option<AsyncToken>,
}

impl<T> CalleeInfo<T> {
    pub(crate) fn new(
        scope: &Scope,
        caller: WeakContextHandle,
        resolver: Resolver<T>,
        origin: Origin,
    ) -> Self {
        let async_token = scope.is_default_context().then(AsyncToken::new);
        Self {
            resolver,
            caller,
            origin,
            async_token,
        }
    }
}
