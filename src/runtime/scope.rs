//! Entered-context scopes.
//!
//! A [`Scope`] is proof that the current thread is running inside a
//! particular context: it holds that context's execution lock for as long
//! as it lives. Every work unit phase and every engine entry point receives
//! the scope it runs in; there is no ambient "current context".
//!
//! Scopes also carry the thread role. A scope entered through the default
//! context's driver is on the *default thread*, and so is every scope
//! nested inside it.

use crate::runtime::config::ContextConfig;
use crate::runtime::context::{ContextInner, ContextKind, StatsSnapshot};
use crate::runtime::executor::ExecutorGuard;
use crate::runtime::handle::ContextHandle;
use crate::runtime::heap::Heap;
use crate::types::{ContextId, RemoteReference};
use std::sync::Arc;

/// The context the current thread is running in.
///
/// Not `Send`: a scope is tied to the thread holding the execution lock.
pub struct Scope {
    context: Arc<ContextInner>,
    guard: ExecutorGuard,
    default_thread: bool,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("context", &self.context.id())
            .field("default_thread", &self.default_thread)
            .finish()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.context.scope_exited();
    }
}

impl Scope {
    /// Acquires the context's execution lock and enters it.
    ///
    /// Entering does not check the context's state; callers that must not
    /// run in a terminating context check it once entered.
    pub(crate) fn enter(context: Arc<ContextInner>, default_thread: bool) -> Self {
        let guard = context.executor.lock();
        context.scope_entered();
        Self {
            context,
            guard,
            default_thread,
        }
    }

    /// Enters another context from inside this one, keeping the thread role.
    pub(crate) fn nested(&self, target: Arc<ContextInner>) -> Self {
        Self::enter(target, self.default_thread)
    }

    /// Releases this scope's execution lock while `f` runs.
    pub(crate) fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.guard.lock().suspend(&self.guard, f)
    }

    pub(crate) const fn context(&self) -> &Arc<ContextInner> {
        &self.context
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.context.heap
    }

    /// Returns the entered context's id.
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// Returns true if the entered context is a default context.
    #[must_use]
    pub fn is_default_context(&self) -> bool {
        self.context.kind() == ContextKind::Default
    }

    /// Returns true if this thread is the default driving thread.
    #[must_use]
    pub const fn is_default_thread(&self) -> bool {
        self.default_thread
    }

    /// Returns the entered context's configuration.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        self.context.config()
    }

    /// Returns a handle to the entered context.
    ///
    /// `None` once every handle has been dropped (the context is then
    /// being disposed).
    #[must_use]
    pub fn handle(&self) -> Option<ContextHandle> {
        self.context.slot().map(ContextHandle::from_slot)
    }

    /// Returns the entered context's counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.context.stats()
    }

    /// Stores a value in the entered context's heap.
    #[must_use]
    pub fn alloc<T: Send + 'static>(&self, value: T) -> RemoteReference<T> {
        let (key, generation) = self.context.heap.insert(Box::new(value));
        RemoteReference::new(self.context.id(), key, generation)
    }
}
