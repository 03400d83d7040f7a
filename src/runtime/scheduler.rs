//! Per-context task queues.
//!
//! Two FIFO queues share one lock: handle tasks (cleanup and bookkeeping
//! scheduled through a handle) and regular tasks (execute and finalize
//! runners). Handle tasks always drain before regular tasks. Once the
//! scheduler is closed, pushes hand the task back to the caller, who drops
//! it outside the lock so the task's own teardown can run.

use crate::runtime::task::BoxedTask;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Which queue a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    Handle,
    Regular,
}

#[derive(Default)]
struct Queues {
    handle_tasks: VecDeque<BoxedTask>,
    tasks: VecDeque<BoxedTask>,
    closed: bool,
    wake_pending: bool,
}

/// Lock-guarded pair of task queues with a wake signal.
#[derive(Default)]
pub(crate) struct Scheduler {
    queues: Mutex<Queues>,
    wake: Condvar,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queues = self.queues.lock();
        f.debug_struct("Scheduler")
            .field("handle_tasks", &queues.handle_tasks.len())
            .field("tasks", &queues.tasks.len())
            .field("closed", &queues.closed)
            .finish()
    }
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueues a regular task, or hands it back if the scheduler is closed.
    pub(crate) fn push_task(&self, task: BoxedTask) -> Result<(), BoxedTask> {
        let mut queues = self.queues.lock();
        if queues.closed {
            return Err(task);
        }
        queues.tasks.push_back(task);
        Ok(())
    }

    /// Enqueues a handle task, or hands it back if the scheduler is closed.
    pub(crate) fn push_handle_task(&self, task: BoxedTask) -> Result<(), BoxedTask> {
        let mut queues = self.queues.lock();
        if queues.closed {
            return Err(task);
        }
        queues.handle_tasks.push_back(task);
        Ok(())
    }

    /// Atomically removes every queued handle task.
    pub(crate) fn take_handle_tasks(&self) -> VecDeque<BoxedTask> {
        std::mem::take(&mut self.queues.lock().handle_tasks)
    }

    /// Removes the next task: handle tasks first, then regular tasks.
    pub(crate) fn pop_task(&self) -> Option<(Lane, BoxedTask)> {
        let mut queues = self.queues.lock();
        if let Some(task) = queues.handle_tasks.pop_front() {
            return Some((Lane::Handle, task));
        }
        queues.tasks.pop_front().map(|task| (Lane::Regular, task))
    }

    /// Signals the thread driving this context.
    pub(crate) fn wake_context(&self) {
        self.queues.lock().wake_pending = true;
        self.wake.notify_all();
    }

    /// Blocks until there is work, a wake signal, or closure, or until the
    /// timeout elapses. Returns true if the caller should look for work.
    pub(crate) fn wait_for_work(&self, timeout: Duration) -> bool {
        let mut queues = self.queues.lock();
        if !queues.has_work() && !queues.closed && !queues.wake_pending {
            let _ = self.wake.wait_for(&mut queues, timeout);
        }
        let ready = queues.has_work() || queues.closed || queues.wake_pending;
        queues.wake_pending = false;
        ready
    }

    /// Closes the scheduler and removes all queued tasks.
    ///
    /// Returns `None` if it was already closed.
    pub(crate) fn close(&self) -> Option<(VecDeque<BoxedTask>, VecDeque<BoxedTask>)> {
        let mut queues = self.queues.lock();
        if queues.closed {
            return None;
        }
        queues.closed = true;
        let drained = (
            std::mem::take(&mut queues.handle_tasks),
            std::mem::take(&mut queues.tasks),
        );
        drop(queues);
        self.wake.notify_all();
        Some(drained)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.queues.lock().closed
    }

    /// Returns the number of queued tasks (handle and regular).
    pub(crate) fn len(&self) -> usize {
        let queues = self.queues.lock();
        queues.handle_tasks.len() + queues.tasks.len()
    }
}

impl Queues {
    fn has_work(&self) -> bool {
        !self.handle_tasks.is_empty() || !self.tasks.is_empty()
    }
}
