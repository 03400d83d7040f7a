//! One-shot cross-thread rendezvous for blocking synchronous calls.
//!
//! The calling thread holds an [`AsyncWait`] and blocks in
//! [`AsyncWait::wait`]; the runner executing on the target context holds
//! the matching [`WaitSignal`] and wakes the waiter exactly once, either
//! explicitly through [`WaitSignal::finish`] or, if the runner is dropped
//! without running, from the signal's `Drop` with a disposal error.
//!
//! A runner may also defer its wake-up: it hands an [`AsyncCompletion`] to
//! asynchronous work, and the waiter wakes only once both the runner has
//! finished and the completion has been settled. The completion's outcome
//! only counts for a deferred runner; settlements arriving after the waiter
//! has been woken are ignored.

use crate::error::{Error, Result};
use crate::types::PortableError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug)]
struct WaitState<P> {
    payload: Option<P>,
    error: Option<PortableError>,
    runner_done: bool,
    deferred: bool,
    /// `Some(None)` once resolved, `Some(Some(e))` once rejected or dropped.
    completion: Option<Option<PortableError>>,
    woken: bool,
}

impl<P> WaitState<P> {
    fn record_error(&mut self, error: Option<PortableError>) {
        if self.error.is_none() {
            self.error = error;
        }
    }

    fn ready(&self) -> bool {
        self.runner_done && (!self.deferred || self.completion.is_some() || self.error.is_some())
    }
}

#[derive(Debug)]
struct WaitShared<P> {
    state: Mutex<WaitState<P>>,
    woken: Condvar,
}

impl<P> WaitShared<P> {
    fn update(&self, f: impl FnOnce(&mut WaitState<P>)) {
        let mut state = self.state.lock();
        if state.woken {
            return;
        }
        f(&mut state);
        if state.ready() {
            if state.deferred {
                let completion_error = state.completion.take().flatten();
                state.record_error(completion_error);
            }
            state.woken = true;
            drop(state);
            self.woken.notify_all();
        }
    }
}

trait CompletionSink: Send + Sync {
    fn complete(&self, error: Option<PortableError>);
}

impl<P: Send> CompletionSink for WaitShared<P> {
    fn complete(&self, error: Option<PortableError>) {
        self.update(|state| {
            if state.completion.is_none() {
                state.completion = Some(error);
            }
        });
    }
}

/// The blocking side of a rendezvous.
#[derive(Debug)]
pub(crate) struct AsyncWait<P> {
    shared: Arc<WaitShared<P>>,
}

/// The waking side of a rendezvous. Wakes the waiter exactly once.
#[derive(Debug)]
pub(crate) struct WaitSignal<P: Send + 'static> {
    shared: Arc<WaitShared<P>>,
    finished: bool,
}

impl<P: Send + 'static> AsyncWait<P> {
    pub(crate) fn new() -> (Self, WaitSignal<P>) {
        let shared = Arc::new(WaitShared {
            state: Mutex::new(WaitState {
                payload: None,
                error: None,
                runner_done: false,
                deferred: false,
                completion: None,
                woken: false,
            }),
            woken: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            WaitSignal {
                shared,
                finished: false,
            },
        )
    }

    /// Blocks until woken, then returns whatever the runner left behind.
    pub(crate) fn wait(self) -> (Option<P>, Option<PortableError>) {
        let mut state = self.shared.state.lock();
        while !state.woken {
            self.shared.woken.wait(&mut state);
        }
        (state.payload.take(), state.error.take())
    }
}

impl<P: Send + 'static> WaitSignal<P> {
    /// Issues a completion token for deferred work.
    pub(crate) fn completion(&self) -> AsyncCompletion {
        AsyncCompletion {
            sink: Some(Arc::clone(&self.shared) as Arc<dyn CompletionSink>),
        }
    }

    /// Reports the runner's outcome.
    ///
    /// With `deferred` set, the waiter stays blocked until the issued
    /// completion settles (unless the runner itself failed).
    pub(crate) fn finish(
        mut self,
        payload: Option<P>,
        error: Option<PortableError>,
        deferred: bool,
    ) {
        self.finished = true;
        self.shared.update(|state| {
            state.payload = payload;
            state.record_error(error);
            state.deferred = deferred;
            state.runner_done = true;
        });
    }
}

impl<P: Send + 'static> Drop for WaitSignal<P> {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.update(|state| {
                state.record_error(Some(PortableError::disposed()));
                state.runner_done = true;
            });
        }
    }
}

/// Completion token for an execute phase that finishes asynchronously.
///
/// Handed to [`WorkUnit::execute_async`](crate::WorkUnit::execute_async)
/// when a synchronous call permits asynchronous completion. The blocked
/// caller resumes once the token is settled. Dropping the token without
/// settling it fails the call.
pub struct AsyncCompletion {
    sink: Option<Arc<dyn CompletionSink>>,
}

impl AsyncCompletion {
    /// Reports success.
    pub fn resolve(self) {
        self.complete(Ok(()));
    }

    /// Reports failure.
    pub fn reject(self, error: Error) {
        self.complete(Err(error));
    }

    /// Reports either outcome.
    pub fn complete(mut self, result: Result<()>) {
        if let Some(sink) = self.sink.take() {
            sink.complete(result.err().map(PortableError::capture));
        }
    }
}

impl std::fmt::Debug for AsyncCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCompletion")
            .field("settled", &self.sink.is_none())
            .finish()
    }
}

impl Drop for AsyncCompletion {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.complete(Some(PortableError::capture(Error::generic(
                "asynchronous completion was dropped without being settled",
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::test_utils::init_test_logging;
    use std::thread;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn finish_wakes_waiter_with_payload() {
        init_test("finish_wakes_waiter_with_payload");
        let (wait, signal) = AsyncWait::<u32>::new();
        let handle = thread::spawn(move || signal.finish(Some(42), None, false));
        let (payload, error) = wait.wait();
        handle.join().expect("join");
        assert_eq!(payload, Some(42));
        assert!(error.is_none());
        crate::test_complete!("finish_wakes_waiter_with_payload");
    }

    #[test]
    fn dropped_signal_wakes_with_disposal() {
        init_test("dropped_signal_wakes_with_disposal");
        let (wait, signal) = AsyncWait::<u32>::new();
        thread::spawn(move || drop(signal)).join().expect("join");
        let (payload, error) = wait.wait();
        assert!(payload.is_none());
        let kind = error.map(|e| e.kind());
        crate::assert_with_log!(
            kind == Some(ErrorKind::ContextDisposed),
            "teardown wakes with disposal",
            Some(ErrorKind::ContextDisposed),
            kind
        );
        crate::test_complete!("dropped_signal_wakes_with_disposal");
    }

    #[test]
    fn deferred_waits_for_completion() {
        init_test("deferred_waits_for_completion");
        let (wait, signal) = AsyncWait::<&'static str>::new();
        let completion = signal.completion();
        signal.finish(Some("unit"), None, true);

        {
            let state = wait.shared.state.lock();
            assert!(!state.woken, "deferred runner alone must not wake");
        }

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            completion.resolve();
        });
        let (payload, error) = wait.wait();
        handle.join().expect("join");
        assert_eq!(payload, Some("unit"));
        assert!(error.is_none());
        crate::test_complete!("deferred_waits_for_completion");
    }

    #[test]
    fn completion_settled_before_finish() {
        init_test("completion_settled_before_finish");
        let (wait, signal) = AsyncWait::<u8>::new();
        signal.completion().reject(Error::range("late"));
        signal.finish(Some(1), None, true);
        let (_, error) = wait.wait();
        assert_eq!(error.map(|e| e.kind()), Some(ErrorKind::Range));
        crate::test_complete!("completion_settled_before_finish");
    }

    #[test]
    fn dropped_completion_fails_the_wait() {
        init_test("dropped_completion_fails_the_wait");
        let (wait, signal) = AsyncWait::<u8>::new();
        let completion = signal.completion();
        signal.finish(Some(1), None, true);
        drop(completion);
        let (_, error) = wait.wait();
        let error = error.expect("abandoned completion reports an error");
        assert_eq!(error.kind(), ErrorKind::Generic);
        crate::test_complete!("dropped_completion_fails_the_wait");
    }

    #[test]
    fn completion_dropped_by_finished_runner_is_ignored() {
        init_test("completion_dropped_by_finished_runner_is_ignored");
        let (wait, signal) = AsyncWait::<u8>::new();
        drop(signal.completion());
        signal.finish(Some(2), None, false);
        let (payload, error) = wait.wait();
        assert_eq!(payload, Some(2));
        assert!(error.is_none());
        crate::test_complete!("completion_dropped_by_finished_runner_is_ignored");
    }

    #[test]
    fn late_completion_is_ignored() {
        init_test("late_completion_is_ignored");
        let (wait, signal) = AsyncWait::<u8>::new();
        let completion = signal.completion();
        signal.finish(Some(3), None, false);
        completion.reject(Error::generic("too late"));
        let (payload, error) = wait.wait();
        assert_eq!(payload, Some(3));
        assert!(error.is_none());
        crate::test_complete!("late_completion_is_ignored");
    }
}
