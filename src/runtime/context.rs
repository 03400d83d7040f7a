//! Execution contexts.
//!
//! A context owns a task queue, a value heap, and an execution lock. Its
//! lifecycle is one-way:
//!
//! ```text
//!   Active ──terminate()──► Disposing ──last scope exits──► Disposed
//! ```
//!
//! Termination closes the scheduler and drops every queued task outside the
//! queue lock, handle tasks first, each in FIFO order. Queued execute
//! runners turn that drop into a "context is disposed" rejection for their
//! caller. Work already executing is not interrupted: the heap is cleared,
//! and the state becomes `Disposed`, only once no scope is entered.

use crate::runtime::config::ContextConfig;
use crate::runtime::executor::ExecutorLock;
use crate::runtime::handle::HandleSlot;
use crate::runtime::heap::Heap;
use crate::runtime::scheduler::{Lane, Scheduler};
use crate::runtime::scope::Scope;
use crate::runtime::task::BoxedTask;
use crate::tracing_compat::{debug, error, trace};
use crate::types::ContextId;
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContextState {
    /// Accepting and running work.
    Active,
    /// Terminating: queued work is rejected, running work is finishing.
    Disposing,
    /// Terminated.
    Disposed,
}

impl ContextState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Disposing => 1,
            Self::Disposed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Disposing,
            _ => Self::Disposed,
        }
    }
}

/// How a context is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextKind {
    /// Bound to the thread that created it and driven explicitly. The only
    /// kind that services cross-thread blocking calls.
    Default,
    /// Driven by its own dedicated thread.
    Worker,
    /// Bound to the creating thread and driven explicitly, without the
    /// default context's privileges.
    Manual,
}

/// Per-context counters.
#[derive(Debug, Default)]
pub(crate) struct ContextStats {
    pub(crate) enqueued: AtomicU64,
    pub(crate) executed: AtomicU64,
    pub(crate) finalized: AtomicU64,
    pub(crate) orphaned: AtomicU64,
    pub(crate) handle_tasks_run: AtomicU64,
    pub(crate) async_waits: AtomicU64,
}

impl ContextStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(
        &self,
        id: ContextId,
        state: ContextState,
        queued: usize,
        values: usize,
    ) -> StatsSnapshot {
        StatsSnapshot {
            id,
            state,
            queued,
            values,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            finalized: self.finalized.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
            handle_tasks_run: self.handle_tasks_run.load(Ordering::Relaxed),
            async_waits: self.async_waits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a context's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// The context.
    pub id: ContextId,
    /// Lifecycle state when the snapshot was taken.
    pub state: ContextState,
    /// Tasks currently queued.
    pub queued: usize,
    /// Values currently stored in the heap.
    pub values: usize,
    /// Tasks pushed onto the queues.
    pub enqueued: u64,
    /// Execute phases run in this context.
    pub executed: u64,
    /// Finalize phases run in this context.
    pub finalized: u64,
    /// Calls from this context rejected because their target never ran them.
    pub orphaned: u64,
    /// Handle tasks run in this context.
    pub handle_tasks_run: u64,
    /// Blocking waits serviced by this context.
    pub async_waits: u64,
}

pub(crate) struct ContextInner {
    id: ContextId,
    kind: ContextKind,
    config: ContextConfig,
    state: AtomicU8,
    /// Live scopes on this context, counting nested and suspended ones.
    entered: AtomicUsize,
    pub(crate) scheduler: Scheduler,
    pub(crate) executor: Arc<ExecutorLock>,
    pub(crate) heap: Heap,
    pub(crate) stats: ContextStats,
    slot: Weak<HandleSlot>,
}

impl std::fmt::Debug for ContextInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextInner")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("locked", &self.executor.is_locked())
            .finish_non_exhaustive()
    }
}

impl ContextInner {
    pub(crate) fn new(
        id: ContextId,
        kind: ContextKind,
        config: ContextConfig,
        slot: Weak<HandleSlot>,
    ) -> Self {
        Self {
            id,
            kind,
            config,
            state: AtomicU8::new(ContextState::Active.as_u8()),
            entered: AtomicUsize::new(0),
            scheduler: Scheduler::new(),
            executor: ExecutorLock::new(),
            heap: Heap::default(),
            stats: ContextStats::default(),
            slot,
        }
    }

    pub(crate) const fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) const fn kind(&self) -> ContextKind {
        self.kind
    }

    pub(crate) const fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == ContextState::Active
    }

    pub(crate) fn slot(&self) -> Option<Arc<HandleSlot>> {
        self.slot.upgrade()
    }

    pub(crate) fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(self.id, self.state(), self.scheduler.len(), self.heap.len())
    }

    pub(crate) fn scope_entered(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn scope_exited(&self) {
        if self.entered.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finish_termination();
        }
    }

    /// Runs one task popped from this context's queue.
    ///
    /// Tasks popped after termination began are dropped instead, which
    /// routes them to their rejection path. The state is checked with the
    /// scope entered, so termination cannot complete under a running task.
    pub(crate) fn run_task(self: &Arc<Self>, lane: Lane, task: BoxedTask, default_thread: bool) {
        let scope = Scope::enter(Arc::clone(self), default_thread);
        if !self.is_active() {
            trace!(context = %self.id, "dropping task for inactive context");
            drop(scope);
            drop(task);
            return;
        }
        if lane == Lane::Handle {
            ContextStats::bump(&self.stats.handle_tasks_run);
        }
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.run(&scope))) {
            error!(
                context = %self.id,
                panic = %crate::types::portable::panic_message(payload.as_ref()),
                "task panicked outside a work unit phase"
            );
        }
    }

    /// Runs every queued handle task in the given scope.
    pub(crate) fn flush_handle_tasks(&self, scope: &Scope) {
        for task in self.scheduler.take_handle_tasks() {
            ContextStats::bump(&self.stats.handle_tasks_run);
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.run(scope))) {
                error!(
                    context = %self.id,
                    panic = %crate::types::portable::panic_message(payload.as_ref()),
                    "handle task panicked"
                );
            }
        }
    }

    /// Starts disposal, rejecting everything still queued.
    ///
    /// Only the first call does anything. The context reaches `Disposed`
    /// here if no scope is entered, otherwise when the last one exits.
    pub(crate) fn terminate(&self) {
        if self
            .state
            .compare_exchange(
                ContextState::Active.as_u8(),
                ContextState::Disposing.as_u8(),
                Ordering::SeqCst,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        let (handle_tasks, tasks) = self.scheduler.close().unwrap_or_default();
        debug!(
            context = %self.id,
            handle_tasks = handle_tasks.len(),
            tasks = tasks.len(),
            "disposing context"
        );
        for task in handle_tasks {
            drop(task);
        }
        for task in tasks {
            drop(task);
        }
        self.finish_termination();
    }

    /// Completes a termination once no scope is entered.
    ///
    /// Called by `terminate` and by the last scope to exit; whichever sees
    /// `Disposing` with nothing entered clears the heap.
    fn finish_termination(&self) {
        if self.entered.load(Ordering::SeqCst) != 0 {
            trace!(context = %self.id, "termination deferred until scopes exit");
            return;
        }
        if self
            .state
            .compare_exchange(
                ContextState::Disposing.as_u8(),
                ContextState::Disposed.as_u8(),
                Ordering::SeqCst,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        drop(self.heap.clear());
        debug!(context = %self.id, "context disposed");
    }
}
