//! Core types shared across the engine.
//!
//! - [`ContextId`]: process-unique context identifiers
//! - [`PortableError`]: failures that can cross a context boundary
//! - [`RemoteReference`]: handles to values owned by a specific context

pub mod id;
pub mod portable;
pub mod rref;

pub use id::ContextId;
pub use portable::PortableError;
pub use rref::{RemoteRefError, RemoteReference};
