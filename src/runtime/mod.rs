//! Contexts and the machinery that runs them.
//!
//! - [`ContextHandle`]: shared, revocable proxy to a context; spawns workers
//! - [`ContextDriver`]: a context driven by the thread that created it
//! - [`Scope`]: proof of running inside a context, passed to every phase
//! - [`Pending`] / [`Resolver`]: settle-once completion pair
//! - [`ContextConfig`]: per-context configuration
//!
//! Internally each context owns a two-lane scheduler, a recursive
//! execution lock, and a heap of values reachable through
//! [`RemoteReference`](crate::RemoteReference).

pub mod completion;
pub mod config;
pub mod context;
pub mod driver;
pub(crate) mod executor;
pub mod handle;
pub(crate) mod heap;
pub(crate) mod scheduler;
pub mod scope;
pub mod task;
pub mod wait;

pub use completion::{CompletionState, Pending, Resolver, channel};
pub use config::{ConfigError, ContextConfig};
pub use context::{ContextKind, ContextState, StatsSnapshot};
pub use driver::ContextDriver;
pub use handle::{ContextHandle, ScheduleOptions};
pub(crate) use handle::WeakContextHandle;
pub use scope::Scope;
pub use task::{BoxedTask, FnTask, Runnable, task_fn};
pub use wait::AsyncCompletion;
