#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

pub use crossexec::test_utils::{
    TEST_SETTLE_TIMEOUT, init_test_logging, test_config, test_default_driver, test_manual_driver,
    test_worker,
};

use crossexec::{Result, Scope};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Initialize logging and announce the test.
pub fn init_test(name: &str) {
    init_test_logging();
    crossexec::test_phase!(name);
}

/// Runs `f` on the worker behind `handle` and waits for its result.
pub fn on_context<R, F>(handle: &crossexec::ContextHandle, f: F) -> R
where
    F: FnOnce(&Scope) -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    handle.schedule(
        crossexec::task_fn(move |scope| {
            let _ = tx.send(f(scope));
        }),
        crossexec::ScheduleOptions::default(),
    );
    match rx.recv_timeout(TEST_SETTLE_TIMEOUT) {
        Ok(value) => value,
        Err(err) => panic!("task on {} did not report back: {err}", handle.id()),
    }
}

/// Polls `cond` until it holds or the settle timeout elapses.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_SETTLE_TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// A shared slot a test can fill from another thread.
pub type Slot<T> = Arc<parking_lot::Mutex<Option<T>>>;

/// Creates an empty [`Slot`].
pub fn slot<T>() -> Slot<T> {
    Arc::new(parking_lot::Mutex::new(None))
}

/// Takes the slot's value, panicking if it was never filled.
pub fn take<T>(slot: &Slot<T>) -> T {
    match slot.lock().take() {
        Some(value) => value,
        None => panic!("slot was never filled"),
    }
}

/// Unwraps a crate result, reporting the error message on failure.
pub fn ok<T: std::fmt::Debug>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("unexpected error: {err}"),
    }
}
