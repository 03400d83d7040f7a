//! Explicitly driven contexts.
//!
//! A [`ContextDriver`] owns a context bound to the thread that created it.
//! Nothing runs in that context unless the owning thread drives it with
//! [`run_pending`](ContextDriver::run_pending),
//! [`run_until`](ContextDriver::run_until) and friends, or enters it with
//! [`enter`](ContextDriver::enter).
//!
//! A *default* driver makes its thread the default thread: synchronous
//! calls made from it may lock other contexts directly, and other threads
//! may block on synchronous calls into it while it drains its queue.

use crate::error::{Error, Result};
use crate::runtime::completion::Pending;
use crate::runtime::config::ContextConfig;
use crate::runtime::context::{ContextInner, ContextKind};
use crate::runtime::handle::ContextHandle;
use crate::runtime::scope::Scope;
use crate::types::ContextId;
use std::marker::PhantomData;
use std::sync::Arc;

/// A context driven by the thread that created it.
///
/// Not `Send`.
pub struct ContextDriver {
    handle: ContextHandle,
    context: Arc<ContextInner>,
    default_thread: bool,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for ContextDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextDriver")
            .field("context", &self.context.id())
            .field("kind", &self.context.kind())
            .finish()
    }
}

impl ContextDriver {
    /// Creates a default context bound to the current thread.
    pub fn new_default(config: ContextConfig) -> Result<Self> {
        Self::create(ContextKind::Default, config)
    }

    /// Creates a manually driven, non-default context bound to the current
    /// thread.
    pub fn new_manual(config: ContextConfig) -> Result<Self> {
        Self::create(ContextKind::Manual, config)
    }

    fn create(kind: ContextKind, config: ContextConfig) -> Result<Self> {
        let config = config.finish()?;
        let (handle, context) = ContextHandle::create(kind, config);
        Ok(Self {
            handle,
            context,
            default_thread: kind == ContextKind::Default,
            _not_send: PhantomData,
        })
    }

    /// Returns the context id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.context.id()
    }

    /// Returns a new handle to the context.
    #[must_use]
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Runs `f` inside the context.
    pub fn enter<R>(&self, f: impl FnOnce(&Scope) -> R) -> Result<R> {
        let scope = Scope::enter(Arc::clone(&self.context), self.default_thread);
        if !self.context.is_active() {
            return Err(Error::context_disposed());
        }
        Ok(f(&scope))
    }

    /// Runs the next queued task, if any. Returns true if one ran.
    pub fn run_one(&self) -> bool {
        match self.context.scheduler.pop_task() {
            Some((lane, task)) => {
                self.context.run_task(lane, task, self.default_thread);
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks until the queue is empty, including tasks queued
    /// while draining. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Drives the context until `done` returns true.
    ///
    /// `done` is checked after every drain and at least once per park
    /// interval. Fails with `ContextDisposed` if the context is disposed
    /// first.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) -> Result<()> {
        let park = self.context.config().park_interval();
        loop {
            self.run_pending();
            if done() {
                return Ok(());
            }
            if !self.context.is_active() {
                return Err(Error::context_disposed());
            }
            self.context.scheduler.wait_for_work(park);
        }
    }

    /// Drives the context until `pending` settles, then takes its outcome.
    pub fn run_until_settled<T>(&self, pending: &Pending<T>) -> Result<T> {
        self.run_until(|| pending.is_settled())?;
        pending
            .try_take()
            .unwrap_or_else(|| Err(Error::internal("settled outcome was already taken")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::task::task_fn;
    use crate::runtime::{ContextState, ScheduleOptions};
    use crate::test_utils::{init_test_logging, test_default_driver, test_manual_driver};
    use crate::ErrorKind;
    use parking_lot::Mutex;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn default_driver_marks_default_thread() {
        init_test("default_driver_marks_default_thread");
        let default = test_default_driver("default-role");
        let manual = test_manual_driver("manual-role");
        default
            .enter(|scope| {
                assert!(scope.is_default_context());
                assert!(scope.is_default_thread());
            })
            .expect("enter default");
        manual
            .enter(|scope| {
                assert!(!scope.is_default_context());
                assert!(!scope.is_default_thread());
            })
            .expect("enter manual");
        crate::test_complete!("default_driver_marks_default_thread");
    }

    #[test]
    fn run_pending_drains_in_order_and_counts() {
        init_test("run_pending_drains_in_order_and_counts");
        let driver = test_manual_driver("drain");
        let handle = driver.handle();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let log = Arc::clone(&log);
            handle.schedule(
                task_fn(move |_| log.lock().push(tag)),
                ScheduleOptions::default(),
            );
        }
        let log_for_handle = Arc::clone(&log);
        handle.schedule(
            task_fn(move |_| log_for_handle.lock().push(99)),
            ScheduleOptions::default().handle_task(true),
        );

        assert!(driver.run_one());
        assert_eq!(*log.lock(), vec![99]);
        assert_eq!(driver.run_pending(), 3);
        assert_eq!(*log.lock(), vec![99, 0, 1, 2]);
        assert!(!driver.run_one());
        crate::test_complete!("run_pending_drains_in_order_and_counts");
    }

    #[test]
    fn run_until_fails_once_disposed() {
        init_test("run_until_fails_once_disposed");
        let driver = test_manual_driver("disposed-drive");
        driver.handle().dispose().expect("dispose");
        assert_eq!(driver.handle().state(), ContextState::Disposed);
        crate::assert_err_kind!(driver.run_until(|| false), ErrorKind::ContextDisposed);
        crate::assert_err_kind!(driver.enter(|_| ()), ErrorKind::ContextDisposed);
        crate::test_complete!("run_until_fails_once_disposed");
    }

    #[test]
    fn tasks_scheduled_while_draining_also_run() {
        init_test("tasks_scheduled_while_draining_also_run");
        let driver = test_manual_driver("chained");
        let handle = driver.handle();
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_log = Arc::clone(&log);
        let inner_handle = handle.clone();
        handle.schedule(
            task_fn(move |_| {
                inner_log.lock().push("first");
                let log = Arc::clone(&inner_log);
                inner_handle.schedule(
                    task_fn(move |_| log.lock().push("second")),
                    ScheduleOptions::default(),
                );
            }),
            ScheduleOptions::default(),
        );
        assert_eq!(driver.run_pending(), 2);
        assert_eq!(*log.lock(), vec!["first", "second"]);
        crate::test_complete!("tasks_scheduled_while_draining_also_run");
    }
}
