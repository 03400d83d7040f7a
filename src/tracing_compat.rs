//! Logging macros used across the crate.
//!
//! With the `tracing-integration` feature these are the `tracing` crate's
//! own macros. Without it they expand to nothing, and `trace_span!` yields a
//! [`NoopSpan`] so that `trace_span!(..).entered()` still compiles.
//!
//! ```rust,ignore
//! use crossexec::tracing_compat::{debug, trace_span};
//!
//! debug!(context = %id, "context disposed");
//! let _span = trace_span!("execute", context = %id).entered();
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, trace, trace_span, warn};

#[cfg(not(feature = "tracing-integration"))]
mod disabled {
    /// Discards a trace-level event.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// Discards a debug-level event.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// Discards a warn-level event.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// Discards an error-level event.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    /// Yields a [`NoopSpan`](crate::tracing_compat::NoopSpan).
    #[macro_export]
    macro_rules! trace_span {
        ($($arg:tt)*) => {
            $crate::tracing_compat::NoopSpan
        };
    }

    pub use crate::{debug, error, trace, trace_span, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use disabled::*;

/// Stand-in for a phase span when tracing is compiled out.
#[cfg(not(feature = "tracing-integration"))]
#[derive(Debug, Clone, Copy)]
pub struct NoopSpan;

#[cfg(not(feature = "tracing-integration"))]
impl NoopSpan {
    /// Returns the span unchanged.
    #[inline]
    #[must_use]
    pub const fn entered(self) -> Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(test_name: &str) {
        init_test_logging();
        crate::test_phase!(test_name);
    }

    #[test]
    fn event_macros_accept_fields() {
        init_test("event_macros_accept_fields");
        trace!(context = 4u64, "task queued");
        debug!(context = 4u64, handle_tasks = 2usize, "disposing context");
        warn!(kind = ?crate::ErrorKind::Generic, "release for another context");
        error!(context = 4u64, panic = "boom", "task panicked");
        crate::test_complete!("event_macros_accept_fields");
    }

    #[test]
    fn phase_span_can_be_entered() {
        init_test("phase_span_can_be_entered");
        let entered = trace_span!("finalize", context = 3u64).entered();
        drop(entered);
        crate::test_complete!("phase_span_can_be_entered");
    }
}
