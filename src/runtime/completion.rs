//! Settle-once completion pair.
//!
//! The requester side of an asynchronous call is a [`Pending`]; the engine
//! holds the matching [`Resolver`] and settles it from the finalize phase:
//!
//! ```text
//!   Resolver                               Pending
//!     │                                       │
//!     │─── resolve(v) ───────────────────────►├── state() == Resolved
//!     │                                       │
//!     │─── reject(e) ────────────────────────►├── state() == Rejected
//!     │                                       │
//!   (drop) ──────────────────────────────────►├── state() == Abandoned
//! ```
//!
//! Settling consumes the resolver, so a second settlement cannot be
//! expressed. A resolver dropped without settling leaves the pending
//! `Abandoned`: neither resolved nor rejected. This is what the requester
//! observes when its context is torn down fatally while finalizing.

use crate::error::{Error, ErrorKind, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Observable state of a [`Pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Not settled yet.
    Unsettled,
    /// Settled with a value.
    Resolved,
    /// Settled with an error.
    Rejected,
    /// The resolver went away without settling.
    Abandoned,
}

impl CompletionState {
    /// Returns true for every state but `Unsettled`.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Unsettled)
    }
}

#[derive(Debug)]
struct Settlement<T> {
    state: CompletionState,
    outcome: Option<Result<T>>,
}

#[derive(Debug)]
struct Shared<T> {
    settlement: Mutex<Settlement<T>>,
    settled: Condvar,
}

impl<T> Shared<T> {
    fn settle(&self, state: CompletionState, outcome: Option<Result<T>>) {
        let mut settlement = self.settlement.lock();
        if settlement.state.is_settled() {
            return;
        }
        settlement.state = state;
        settlement.outcome = outcome;
        drop(settlement);
        self.settled.notify_all();
    }
}

/// Creates a linked resolver/pending pair.
#[must_use]
pub fn channel<T>() -> (Resolver<T>, Pending<T>) {
    let shared = Arc::new(Shared {
        settlement: Mutex::new(Settlement {
            state: CompletionState::Unsettled,
            outcome: None,
        }),
        settled: Condvar::new(),
    });
    (
        Resolver {
            shared: Some(Arc::clone(&shared)),
        },
        Pending { shared },
    )
}

/// The settling side of a completion pair.
#[derive(Debug)]
pub struct Resolver<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Resolver<T> {
    /// Settles with a value.
    pub fn resolve(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            shared.settle(CompletionState::Resolved, Some(Ok(value)));
        }
    }

    /// Settles with an error.
    pub fn reject(mut self, error: Error) {
        if let Some(shared) = self.shared.take() {
            shared.settle(CompletionState::Rejected, Some(Err(error)));
        }
    }

    /// Settles with either outcome.
    pub fn settle(self, result: Result<T>) {
        match result {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.settle(CompletionState::Abandoned, None);
        }
    }
}

/// The requester side of a completion pair.
#[derive(Debug)]
pub struct Pending<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Pending<T> {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CompletionState {
        self.shared.settlement.lock().state
    }

    /// Returns true once resolved, rejected, or abandoned.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// Takes the outcome if settled.
    ///
    /// An abandoned completion yields a `FatalTermination` error. Returns
    /// `None` while unsettled, and after the outcome has been taken.
    pub fn try_take(&self) -> Option<Result<T>> {
        let mut settlement = self.shared.settlement.lock();
        take_settled(&mut settlement)
    }

    /// Blocks until settled or until `timeout` elapses.
    ///
    /// Must not be called on the thread that drives the caller context: the
    /// finalize phase that settles this completion runs there.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        let deadline = Instant::now() + timeout;
        let mut settlement = self.shared.settlement.lock();
        while !settlement.state.is_settled() {
            if self
                .shared
                .settled
                .wait_until(&mut settlement, deadline)
                .timed_out()
            {
                break;
            }
        }
        take_settled(&mut settlement)
    }
}

fn take_settled<T>(settlement: &mut Settlement<T>) -> Option<Result<T>> {
    match settlement.state {
        CompletionState::Unsettled => None,
        CompletionState::Abandoned => Some(Err(abandoned())),
        CompletionState::Resolved | CompletionState::Rejected => settlement.outcome.take(),
    }
}

fn abandoned() -> Error {
    Error::new(ErrorKind::FatalTermination)
        .with_message("requester was abandoned without being settled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::thread;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn resolve_then_take_once() {
        init_test("resolve_then_take_once");
        let (resolver, pending) = channel::<u32>();
        assert_eq!(pending.state(), CompletionState::Unsettled);
        assert!(pending.try_take().is_none());

        resolver.resolve(42);
        assert_eq!(pending.state(), CompletionState::Resolved);
        assert_eq!(pending.try_take().expect("settled").expect("ok"), 42);
        assert!(pending.try_take().is_none(), "outcome taken once");
        assert_eq!(pending.state(), CompletionState::Resolved);
        crate::test_complete!("resolve_then_take_once");
    }

    #[test]
    fn reject_carries_error() {
        init_test("reject_carries_error");
        let (resolver, pending) = channel::<u32>();
        resolver.reject(Error::range("out of range"));
        assert_eq!(pending.state(), CompletionState::Rejected);
        let err = pending.try_take().expect("settled").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Range);
        crate::test_complete!("reject_carries_error");
    }

    #[test]
    fn settle_maps_result_to_state() {
        init_test("settle_maps_result_to_state");
        let (resolver, pending) = channel::<u32>();
        resolver.settle(Ok(3));
        assert_eq!(pending.state(), CompletionState::Resolved);
        assert_eq!(pending.try_take().expect("settled").expect("ok"), 3);

        let (resolver, pending) = channel::<u32>();
        resolver.settle(Err(Error::validation("rejected")));
        assert_eq!(pending.state(), CompletionState::Rejected);
        crate::assert_err_kind!(pending.try_take().expect("settled"), ErrorKind::Validation);
        crate::test_complete!("settle_maps_result_to_state");
    }

    #[test]
    fn dropped_resolver_abandons() {
        init_test("dropped_resolver_abandons");
        let (resolver, pending) = channel::<u32>();
        drop(resolver);
        let state = pending.state();
        crate::assert_with_log!(
            state == CompletionState::Abandoned,
            "drop without settle abandons",
            CompletionState::Abandoned,
            state
        );
        let err = pending.try_take().expect("settled").expect_err("abandoned");
        assert!(err.is_fatal());
        crate::test_complete!("dropped_resolver_abandons");
    }

    #[test]
    fn wait_timeout_across_threads() {
        init_test("wait_timeout_across_threads");
        let (resolver, pending) = channel::<String>();
        assert!(pending.wait_timeout(Duration::from_millis(5)).is_none());

        let handle = thread::spawn(move || resolver.resolve("done".to_string()));
        let value = pending
            .wait_timeout(Duration::from_secs(5))
            .expect("settled")
            .expect("ok");
        assert_eq!(value, "done");
        handle.join().expect("join");
        crate::test_complete!("wait_timeout_across_threads");
    }
}
