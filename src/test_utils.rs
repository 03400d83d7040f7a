//! Test utilities for Crossexec.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Context constructors with test-friendly configuration
//!
//! # Example
//! ```
//! use crossexec::test_utils::{init_test_logging, test_worker};
//!
//! init_test_logging();
//! let worker = test_worker("example");
//! worker.dispose().expect("dispose");
//! ```

use crate::runtime::{ContextConfig, ContextDriver, ContextHandle};
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Upper bound tests wait on a [`Pending`](crate::Pending) before failing.
pub const TEST_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Configuration used by test contexts: short park interval, named after the test.
#[must_use]
pub fn test_config(name: &str) -> ContextConfig {
    ContextConfig::default()
        .name(name)
        .thread_name_prefix("crossexec-test")
        .park_interval_ms(5)
}

/// Spawn a worker context with [`test_config`].
#[must_use]
pub fn test_worker(name: &str) -> ContextHandle {
    match ContextHandle::spawn(test_config(name)) {
        Ok(handle) => handle,
        Err(err) => unreachable!("failed to spawn test worker {name}: {err}"),
    }
}

/// Create a default context bound to the current thread.
#[must_use]
pub fn test_default_driver(name: &str) -> ContextDriver {
    match ContextDriver::new_default(test_config(name)) {
        Ok(driver) => driver,
        Err(err) => unreachable!("failed to create default driver {name}: {err}"),
    }
}

/// Create a manually driven (non-default) context bound to the current thread.
#[must_use]
pub fn test_manual_driver(name: &str) -> ContextDriver {
    match ContextDriver::new_manual(test_config(name)) {
        Ok(driver) => driver,
        Err(err) => unreachable!("failed to create manual driver {name}: {err}"),
    }
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that a result is an error of the given [`ErrorKind`](crate::ErrorKind).
#[macro_export]
macro_rules! assert_err_kind {
    ($result:expr, $kind:expr) => {
        match $result {
            Err(err) => assert_eq!(err.kind(), $kind, "unexpected error: {err}"),
            Ok(v) => unreachable!("expected Err({:?}), got Ok({:?})", $kind, v),
        }
    };
}
