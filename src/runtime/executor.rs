//! The per-context execution lock.
//!
//! At most one thread runs inside a context at any instant. The lock is
//! recursive: a thread that already holds it may acquire it again, which is
//! what makes nested synchronous calls back into a held context safe. The
//! owner thread and depth are tracked explicitly so callers can ask whether
//! the current thread holds the lock before deciding how to dispatch.

use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Recursive execution lock with owner tracking.
#[derive(Debug, Default)]
pub(crate) struct ExecutorLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ExecutorLock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquires the lock, blocking while another thread holds it.
    pub(crate) fn lock(self: &Arc<Self>) -> ExecutorGuard {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            Some(owner) if owner == me => state.depth += 1,
            _ => {
                while state.owner.is_some() {
                    self.released.wait(&mut state);
                }
                state.owner = Some(me);
                state.depth = 1;
            }
        }
        drop(state);
        ExecutorGuard {
            lock: Arc::clone(self),
            _not_send: PhantomData,
        }
    }

    /// Returns true if the calling thread currently holds the lock.
    pub(crate) fn held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Returns true if any thread holds the lock.
    pub(crate) fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Fully releases the calling thread's hold on the lock while `f` runs,
    /// then reacquires it at the same depth.
    ///
    /// Requires the calling thread to hold the lock (the guard proves it).
    pub(crate) fn suspend<R>(&self, _held: &ExecutorGuard, f: impl FnOnce() -> R) -> R {
        let me = thread::current().id();
        let depth = {
            let mut state = self.state.lock();
            debug_assert_eq!(state.owner, Some(me));
            let depth = state.depth;
            state.owner = None;
            state.depth = 0;
            depth
        };
        self.released.notify_one();

        let result = f();

        let mut state = self.state.lock();
        while state.owner.is_some() {
            self.released.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = depth;
        result
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }
}

/// Proof that the current thread holds an [`ExecutorLock`].
///
/// Not `Send`: the lock is owned by a thread, so the guard must be dropped
/// on the thread that acquired it.
#[derive(Debug)]
pub(crate) struct ExecutorGuard {
    lock: Arc<ExecutorLock>,
    _not_send: PhantomData<*const ()>,
}

impl ExecutorGuard {
    pub(crate) fn lock(&self) -> &Arc<ExecutorLock> {
        &self.lock
    }
}

impl Drop for ExecutorGuard {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn recursive_acquire_tracks_depth() {
        init_test("recursive_acquire_tracks_depth");
        let lock = ExecutorLock::new();
        assert!(!lock.is_locked());

        let outer = lock.lock();
        let inner = lock.lock();
        assert!(lock.held_by_current_thread());
        drop(inner);
        assert!(lock.held_by_current_thread(), "outer hold survives inner release");
        drop(outer);
        assert!(!lock.is_locked());
        crate::test_complete!("recursive_acquire_tracks_depth");
    }

    #[test]
    fn other_thread_blocks_until_release() {
        init_test("other_thread_blocks_until_release");
        let lock = ExecutorLock::new();
        let guard = lock.lock();
        let acquired = Arc::new(AtomicBool::new(false));

        let thread_lock = Arc::clone(&lock);
        let thread_flag = Arc::clone(&acquired);
        let handle = thread::spawn(move || {
            assert!(!thread_lock.held_by_current_thread());
            let _guard = thread_lock.lock();
            thread_flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        let early = acquired.load(Ordering::SeqCst);
        crate::assert_with_log!(!early, "second thread must wait", false, early);
        drop(guard);
        handle.join().expect("join");
        assert!(acquired.load(Ordering::SeqCst));
        crate::test_complete!("other_thread_blocks_until_release");
    }

    #[test]
    fn suspend_lets_another_thread_in_and_restores_depth() {
        init_test("suspend_lets_another_thread_in_and_restores_depth");
        let lock = ExecutorLock::new();
        let outer = lock.lock();
        let inner = lock.lock();

        let (tx, rx) = mpsc::channel();
        lock.suspend(&inner, || {
            let thread_lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = thread_lock.lock();
                tx.send(()).expect("send");
            })
            .join()
            .expect("join");
        });
        rx.recv().expect("other thread ran while suspended");

        assert!(lock.held_by_current_thread());
        drop(inner);
        assert!(lock.held_by_current_thread(), "depth restored to two");
        drop(outer);
        assert!(!lock.is_locked());
        crate::test_complete!("suspend_lets_another_thread_in_and_restores_depth");
    }
}
