//! Context configuration types.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `name` | `None` |
//! | `thread_name_prefix` | `"crossexec-context"` |
//! | `thread_stack_size` | 2 MiB |
//! | `capture_origin` | `true` |
//! | `max_stack_frames` | 10 |
//! | `park_interval_ms` | 50 |

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_THREAD_PREFIX: &str = "crossexec-context";
const DEFAULT_MAX_STACK_FRAMES: usize = 10;
const MAX_STACK_FRAMES_LIMIT: usize = 256;
const DEFAULT_PARK_INTERVAL_MS: u64 = 50;

/// Error returned when a configuration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A field holds a value that cannot be used.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// The configuration text could not be parsed.
    #[error("failed to parse context config: {0}")]
    Parse(String),
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        Self::validation(err.to_string())
    }
}

/// Configuration for a single execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Human-readable name, used in logs and as the worker thread suffix.
    pub name: Option<String>,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// Stack size of a worker thread (default: 2MB).
    pub thread_stack_size: usize,
    /// Attach the caller's call site to errors delivered back to it.
    pub capture_origin: bool,
    /// Upper bound on stack frames kept per delivered error.
    pub max_stack_frames: usize,
    /// How often a blocked driver re-checks its wait condition.
    pub park_interval_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            name: None,
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
            thread_stack_size: DEFAULT_STACK_SIZE,
            capture_origin: true,
            max_stack_frames: DEFAULT_MAX_STACK_FRAMES,
            park_interval_ms: DEFAULT_PARK_INTERVAL_MS,
        }
    }
}

impl ContextConfig {
    /// Sets the context name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the worker thread stack size.
    #[must_use]
    pub const fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Enables or disables origin frame capture.
    #[must_use]
    pub const fn capture_origin(mut self, enabled: bool) -> Self {
        self.capture_origin = enabled;
        self
    }

    /// Sets the per-error stack frame bound.
    #[must_use]
    pub const fn max_stack_frames(mut self, frames: usize) -> Self {
        self.max_stack_frames = frames;
        self
    }

    /// Sets the driver re-check interval in milliseconds.
    #[must_use]
    pub const fn park_interval_ms(mut self, ms: u64) -> Self {
        self.park_interval_ms = ms;
        self
    }

    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.thread_stack_size == 0 {
            self.thread_stack_size = DEFAULT_STACK_SIZE;
        }
        if self.max_stack_frames == 0 {
            self.max_stack_frames = 1;
        }
        if self.park_interval_ms == 0 {
            self.park_interval_ms = 1;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_PREFIX.to_string();
        }
    }

    /// Checks values that cannot be normalized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name_prefix.contains('\0') {
            return Err(ConfigError::Invalid {
                field: "thread_name_prefix",
                reason: "must not contain NUL bytes".to_string(),
            });
        }
        if self.name.as_deref().is_some_and(|n| n.contains('\0')) {
            return Err(ConfigError::Invalid {
                field: "name",
                reason: "must not contain NUL bytes".to_string(),
            });
        }
        if self.max_stack_frames > MAX_STACK_FRAMES_LIMIT {
            return Err(ConfigError::Invalid {
                field: "max_stack_frames",
                reason: format!("must be at most {MAX_STACK_FRAMES_LIMIT}"),
            });
        }
        Ok(())
    }

    /// Validates and normalizes in one step.
    pub fn finish(mut self) -> Result<Self, ConfigError> {
        self.validate()?;
        self.normalize();
        Ok(self)
    }

    /// Returns the park interval as a duration.
    #[must_use]
    pub const fn park_interval(&self) -> Duration {
        Duration::from_millis(self.park_interval_ms)
    }

    /// Returns the name of the worker thread for this context.
    #[must_use]
    pub fn thread_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{}-{name}", self.thread_name_prefix),
            None => self.thread_name_prefix.clone(),
        }
    }

    /// Parses a configuration from TOML text.
    ///
    /// Missing fields take their defaults; the result is validated and
    /// normalized.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.finish()
    }
}
