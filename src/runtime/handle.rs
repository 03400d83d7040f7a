//! Shared, thread-safe handles to contexts.
//!
//! A [`ContextHandle`] is the only way to reach a context from outside it.
//! All clones share one atomically swappable slot; disposal empties the
//! slot exactly once, after which every clone observes an empty handle and
//! anything scheduled through it is dropped, which makes the work reject
//! itself. Dropping the last clone disposes the context.
//!
//! Work queued on a context that must later reach its caller keeps only a
//! [`WeakContextHandle`] to it, so a queued task never keeps its own
//! context alive.

use crate::error::{Error, Result};
use crate::runtime::config::ContextConfig;
use crate::runtime::context::{
    ContextInner, ContextKind, ContextState, ContextStats, StatsSnapshot,
};
use crate::runtime::scope::Scope;
use crate::runtime::task::BoxedTask;
use crate::tracing_compat::{debug, trace};
use crate::types::ContextId;
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Weak};

/// How a task is handed to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// Run in place when scheduling from inside the target.
    pub run_inline: bool,
    /// Signal the target's driving thread after enqueueing.
    pub wake: bool,
    /// Enqueue on the handle-task queue, drained before regular tasks.
    pub handle_task: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            run_inline: false,
            wake: true,
            handle_task: false,
        }
    }
}

impl ScheduleOptions {
    /// Sets `run_inline`.
    #[must_use]
    pub const fn run_inline(mut self, run_inline: bool) -> Self {
        self.run_inline = run_inline;
        self
    }

    /// Sets `wake`.
    #[must_use]
    pub const fn wake(mut self, wake: bool) -> Self {
        self.wake = wake;
        self
    }

    /// Sets `handle_task`.
    #[must_use]
    pub const fn handle_task(mut self, handle_task: bool) -> Self {
        self.handle_task = handle_task;
        self
    }
}

pub(crate) struct HandleSlot {
    id: ContextId,
    context: ArcSwapOption<ContextInner>,
}

impl HandleSlot {
    fn dispose(&self) -> bool {
        match self.context.swap(None) {
            Some(context) => {
                context.terminate();
                true
            }
            None => false,
        }
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        if self.dispose() {
            debug!(context = %self.id, "last handle dropped; context disposed");
        }
    }
}

/// A shared proxy to a context.
#[derive(Clone)]
pub struct ContextHandle {
    slot: Arc<HandleSlot>,
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.slot.id)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        self.slot.id == other.slot.id
    }
}

impl Eq for ContextHandle {}

impl ContextHandle {
    /// Creates a context and its first handle.
    pub(crate) fn create(kind: ContextKind, config: ContextConfig) -> (Self, Arc<ContextInner>) {
        let id = ContextId::next();
        let slot = Arc::new_cyclic(|weak| HandleSlot {
            id,
            context: ArcSwapOption::from_pointee(ContextInner::new(id, kind, config, weak.clone())),
        });
        let handle = Self { slot };
        let inner = handle
            .get_context()
            .unwrap_or_else(|| unreachable!("freshly created slot is populated"));
        debug!(context = %id, kind = ?kind, "context created");
        (handle, inner)
    }

    pub(crate) const fn from_slot(slot: Arc<HandleSlot>) -> Self {
        Self { slot }
    }

    /// Returns a reference that does not keep the context alive.
    pub(crate) fn downgrade(&self) -> WeakContextHandle {
        WeakContextHandle {
            id: self.slot.id,
            slot: Arc::downgrade(&self.slot),
        }
    }

    /// Starts a worker context on its own named thread.
    ///
    /// The thread drains the context's queue until the context is disposed.
    pub fn spawn(config: ContextConfig) -> Result<Self> {
        let config = config.finish()?;
        let thread_name = config.thread_name();
        let stack_size = config.thread_stack_size;
        let (handle, inner) = Self::create(ContextKind::Worker, config);
        let spawned = std::thread::Builder::new()
            .name(thread_name)
            .stack_size(stack_size)
            .spawn(move || worker_main(&inner));
        if let Err(err) = spawned {
            let _ = handle.dispose();
            return Err(Error::internal("failed to spawn context thread").with_source(err));
        }
        Ok(handle)
    }

    /// Returns the context id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.slot.id
    }

    /// Disposes the context.
    ///
    /// Fails with `AlreadyDisposed` if the handle is already empty.
    pub fn dispose(&self) -> Result<()> {
        if self.slot.dispose() {
            Ok(())
        } else {
            Err(Error::already_disposed())
        }
    }

    /// Loads the context, if the handle has not been disposed.
    pub(crate) fn get_context(&self) -> Option<Arc<ContextInner>> {
        self.slot.context.load_full()
    }

    /// Returns true once the handle has been emptied.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.slot.context.load().is_none()
    }

    /// Returns the context's lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.get_context()
            .map_or(ContextState::Disposed, |context| context.state())
    }

    /// Returns the context's counters, if it has not been disposed.
    #[must_use]
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.get_context().map(|context| context.stats())
    }

    /// Hands a task to the context from outside it.
    ///
    /// `run_inline` has no effect here; use [`schedule_in`](Self::schedule_in)
    /// to run in place when already inside the target. If the handle is
    /// empty, or the context stops accepting work, the task is dropped.
    pub fn schedule(&self, task: BoxedTask, options: ScheduleOptions) {
        let Some(context) = self.get_context() else {
            trace!(context = %self.slot.id, "scheduling on disposed handle; dropping task");
            drop(task);
            return;
        };
        let pushed = if options.handle_task {
            context.scheduler.push_handle_task(task)
        } else {
            context.scheduler.push_task(task)
        };
        match pushed {
            Ok(()) => {
                ContextStats::bump(&context.stats.enqueued);
                if options.wake {
                    context.scheduler.wake_context();
                }
            }
            Err(task) => {
                trace!(context = %self.slot.id, "scheduler closed; dropping task");
                drop(task);
            }
        }
    }

    /// Hands a task to the context from inside `scope`.
    ///
    /// With `run_inline`, a task scheduled from inside the target runs
    /// immediately, without touching the queue.
    pub fn schedule_in(&self, scope: &Scope, task: BoxedTask, options: ScheduleOptions) {
        if options.run_inline && scope.context_id() == self.id() && scope.context().is_active() {
            trace!(context = %self.slot.id, "running task inline");
            task.run(scope);
            return;
        }
        self.schedule(task, options);
    }
}

/// Non-owning counterpart of [`ContextHandle`].
#[derive(Clone)]
pub(crate) struct WeakContextHandle {
    id: ContextId,
    slot: Weak<HandleSlot>,
}

impl std::fmt::Debug for WeakContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakContextHandle")
            .field("id", &self.id)
            .field("live", &(self.slot.strong_count() > 0))
            .finish()
    }
}

impl WeakContextHandle {
    pub(crate) const fn id(&self) -> ContextId {
        self.id
    }

    /// Returns a handle while at least one other handle is still alive.
    pub(crate) fn upgrade(&self) -> Option<ContextHandle> {
        self.slot.upgrade().map(ContextHandle::from_slot)
    }
}

fn worker_main(context: &Arc<ContextInner>) {
    debug!(context = %context.id(), "worker thread started");
    let park = context.config().park_interval();
    loop {
        if let Some((lane, task)) = context.scheduler.pop_task() {
            context.run_task(lane, task, false);
            continue;
        }
        if context.scheduler.is_closed() {
            break;
        }
        context.scheduler.wait_for_work(park);
    }
    debug!(context = %context.id(), "worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::task::task_fn;
    use crate::test_utils::{init_test_logging, test_config, test_manual_driver, test_worker};
    use crate::ErrorKind;
    use std::sync::mpsc;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn dispose_empties_handle_exactly_once() {
        init_test("dispose_empties_handle_exactly_once");
        let worker = test_worker("dispose-once");
        let clone = worker.clone();
        assert_eq!(worker.state(), ContextState::Active);

        worker.dispose().expect("first dispose");
        assert!(clone.is_disposed());
        assert_eq!(clone.state(), ContextState::Disposed);
        crate::assert_err_kind!(clone.dispose(), ErrorKind::AlreadyDisposed);
        assert!(clone.stats().is_none());
        crate::test_complete!("dispose_empties_handle_exactly_once");
    }

    #[test]
    fn worker_runs_scheduled_tasks() {
        init_test("worker_runs_scheduled_tasks");
        let worker = test_worker("runs-tasks");
        let (tx, rx) = mpsc::channel();
        let expected = worker.id();
        worker.schedule(
            task_fn(move |scope| {
                tx.send(scope.context_id()).expect("send");
            }),
            ScheduleOptions::default(),
        );
        let ran_in = rx.recv_timeout(Duration::from_secs(5)).expect("task ran");
        assert_eq!(ran_in, expected);
        worker.dispose().expect("dispose");
        crate::test_complete!("worker_runs_scheduled_tasks");
    }

    #[test]
    fn scheduling_on_disposed_handle_drops_task() {
        init_test("scheduling_on_disposed_handle_drops_task");
        struct DropFlag(mpsc::Sender<()>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                let _ = self.0.send(());
            }
        }

        let worker = test_worker("dropped");
        worker.dispose().expect("dispose");
        let (tx, rx) = mpsc::channel();
        let flag = DropFlag(tx);
        worker.schedule(
            task_fn(move |_| drop(flag)),
            ScheduleOptions::default(),
        );
        assert!(rx.try_recv().is_ok(), "task dropped synchronously");
        crate::test_complete!("scheduling_on_disposed_handle_drops_task");
    }

    #[test]
    fn inline_schedule_skips_queue() {
        init_test("inline_schedule_skips_queue");
        let driver = test_manual_driver("inline");
        let handle = driver.handle();
        let ran = driver
            .enter(|scope| {
                let (tx, rx) = mpsc::channel();
                handle.schedule_in(
                    scope,
                    task_fn(move |_| tx.send(()).expect("send")),
                    ScheduleOptions::default().run_inline(true),
                );
                rx.try_recv().is_ok()
            })
            .expect("enter");
        assert!(ran);
        let stats = handle.stats().expect("stats");
        assert_eq!(stats.enqueued, 0);
        assert_eq!(stats.queued, 0);
        crate::test_complete!("inline_schedule_skips_queue");
    }

    #[test]
    fn last_handle_drop_disposes() {
        init_test("last_handle_drop_disposes");
        let driver = test_manual_driver("last-drop");
        let handle = driver.handle();
        let inner = handle.get_context().expect("live");
        drop(handle);
        assert_eq!(inner.state(), ContextState::Active, "driver still holds a handle");
        drop(driver);
        assert_eq!(inner.state(), ContextState::Disposed);
        crate::test_complete!("last_handle_drop_disposes");
    }

    #[test]
    fn weak_handle_does_not_keep_context_alive() {
        init_test("weak_handle_does_not_keep_context_alive");
        let driver = test_manual_driver("weak");
        let weak = driver.handle().downgrade();
        assert_eq!(weak.id(), driver.id());
        assert!(weak.upgrade().is_some());

        let inner = driver.handle().get_context().expect("live");
        drop(driver);
        assert!(weak.upgrade().is_none());
        assert_eq!(inner.state(), ContextState::Disposed);
        crate::test_complete!("weak_handle_does_not_keep_context_alive");
    }

    #[test]
    fn spawn_rejects_invalid_config() {
        init_test("spawn_rejects_invalid_config");
        let config = test_config("bad").thread_name_prefix("nul\0");
        crate::assert_err_kind!(ContextHandle::spawn(config), ErrorKind::Validation);
        crate::test_complete!("spawn_rejects_invalid_config");
    }
}
