//! The work unit contract and ready-made units.
//!
//! A work unit is consumed exactly once and moves through three phases:
//!
//! | Phase | Runs in | Receives |
//! |-------|---------|----------|
//! | `prepare` | caller | caller scope |
//! | `execute` | target | target scope |
//! | `finalize` | caller | caller scope |
//!
//! Values computed in `execute` are stored on the unit itself and turned
//! into the caller-side result by `finalize`. Panics in any phase are
//! caught and reported as [`ErrorKind::Generic`](crate::ErrorKind::Generic)
//! errors.

use crate::error::{Error, Result};
use crate::runtime::{AsyncCompletion, Scope};
use crate::types::RemoteReference;

/// How an asynchronous-capable execute phase finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Execution is complete.
    Done,
    /// Execution continues elsewhere; the caller resumes once the
    /// [`AsyncCompletion`] is settled.
    Deferred,
}

/// A three-phase unit of cross-context work.
pub trait WorkUnit: Send + 'static {
    /// The value delivered to the requester.
    type Output: Send + 'static;

    /// Validates arguments and captures what `execute` needs, in the caller.
    fn prepare(&mut self, _scope: &Scope) -> Result<()> {
        Ok(())
    }

    /// Does the work, in the target.
    fn execute(&mut self, scope: &Scope) -> Result<()>;

    /// Does the work in the target, possibly finishing later.
    ///
    /// Called instead of [`execute`](Self::execute) for synchronous calls
    /// that permit asynchronous completion. The default runs `execute`.
    fn execute_async(&mut self, scope: &Scope, completion: AsyncCompletion) -> Result<Dispatch> {
        drop(completion);
        self.execute(scope)?;
        Ok(Dispatch::Done)
    }

    /// Produces the requester's value, in the caller.
    fn finalize(self: Box<Self>, scope: &Scope) -> Result<Self::Output>;
}

fn not_executed() -> Error {
    Error::internal("finalize ran before execute produced a value")
}

fn executed_twice() -> Error {
    Error::internal("work unit executed twice")
}

/// Runs a closure in the target and delivers its result to the caller.
pub struct FnUnit<F, V> {
    f: Option<F>,
    value: Option<V>,
}

impl<F, V> FnUnit<F, V>
where
    F: FnOnce(&Scope) -> Result<V> + Send + 'static,
    V: Send + 'static,
{
    /// Wraps `f`.
    pub const fn new(f: F) -> Self {
        Self {
            f: Some(f),
            value: None,
        }
    }
}

impl<F, V> std::fmt::Debug for FnUnit<F, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnUnit")
            .field("executed", &self.f.is_none())
            .finish()
    }
}

impl<F, V> WorkUnit for FnUnit<F, V>
where
    F: FnOnce(&Scope) -> Result<V> + Send + 'static,
    V: Send + 'static,
{
    type Output = V;

    fn execute(&mut self, scope: &Scope) -> Result<()> {
        let f = self.f.take().ok_or_else(executed_twice)?;
        self.value = Some(f(scope)?);
        Ok(())
    }

    fn finalize(self: Box<Self>, _scope: &Scope) -> Result<V> {
        self.value.ok_or_else(not_executed)
    }
}

/// Copies a remote value back to the caller.
#[derive(Debug)]
pub struct CopyOut<T> {
    reference: RemoteReference<T>,
    value: Option<T>,
}

impl<T: Clone + Send + 'static> CopyOut<T> {
    /// Copies the value behind `reference`.
    #[must_use]
    pub const fn new(reference: RemoteReference<T>) -> Self {
        Self {
            reference,
            value: None,
        }
    }
}

impl<T: Clone + Send + 'static> WorkUnit for CopyOut<T> {
    type Output = T;

    fn execute(&mut self, scope: &Scope) -> Result<()> {
        self.value = Some(self.reference.get(scope)?);
        Ok(())
    }

    fn finalize(self: Box<Self>, _scope: &Scope) -> Result<T> {
        self.value.ok_or_else(not_executed)
    }
}

/// Runs a closure against a remote value inside its owner.
pub struct Invoke<T, F, R> {
    reference: RemoteReference<T>,
    f: Option<F>,
    result: Option<R>,
}

impl<T, F, R> Invoke<T, F, R>
where
    T: Send + 'static,
    F: FnOnce(&mut T) -> R + Send + 'static,
    R: Send + 'static,
{
    /// Applies `f` to the value behind `reference`.
    pub const fn new(reference: RemoteReference<T>, f: F) -> Self {
        Self {
            reference,
            f: Some(f),
            result: None,
        }
    }
}

impl<T, F, R> std::fmt::Debug for Invoke<T, F, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoke")
            .field("reference", &self.reference)
            .field("executed", &self.f.is_none())
            .finish()
    }
}

impl<T, F, R> WorkUnit for Invoke<T, F, R>
where
    T: Send + 'static,
    F: FnOnce(&mut T) -> R + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn execute(&mut self, scope: &Scope) -> Result<()> {
        let f = self.f.take().ok_or_else(executed_twice)?;
        self.result = Some(self.reference.with_mut(scope, f)?);
        Ok(())
    }

    fn finalize(self: Box<Self>, _scope: &Scope) -> Result<R> {
        self.result.ok_or_else(not_executed)
    }
}
