//! Type-erased tasks stored in a context's queues.
//!
//! A [`Runnable`] is consumed exactly once: either [`Runnable::run`] is called
//! with a scope entered on the owning context, or the task is dropped. Tasks
//! that must report something when they never run (the execute runner, for
//! one) do so from their `Drop` impl.

use crate::runtime::Scope;

/// A unit of work queued on a context.
pub trait Runnable: Send + 'static {
    /// Runs the task inside the given scope.
    fn run(self: Box<Self>, scope: &Scope);
}

/// A boxed task as stored in the scheduler.
pub type BoxedTask = Box<dyn Runnable>;

/// Wraps a closure as a [`Runnable`].
pub struct FnTask<F> {
    f: F,
}

impl<F> Runnable for FnTask<F>
where
    F: FnOnce(&Scope) + Send + 'static,
{
    fn run(self: Box<Self>, scope: &Scope) {
        (self.f)(scope);
    }
}

impl<F> std::fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").finish_non_exhaustive()
    }
}

/// Boxes a closure into a queueable task.
pub fn task_fn<F>(f: F) -> BoxedTask
where
    F: FnOnce(&Scope) + Send + 'static,
{
    Box::new(FnTask { f })
}
