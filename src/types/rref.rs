//! Context-owned reference type.
//!
//! `RemoteReference<T>` names a value living in one context's heap. The
//! reference itself is a plain `Copy` handle (owner id, slot key,
//! generation) and may travel to any thread or context, but the value can
//! only be reached through a [`Scope`](crate::Scope) entered on the owning
//! context, that is, while holding the owner's execution lock.
//!
//! Access is validated at runtime:
//! 1. the scope's context must be the owner
//! 2. the slot generation must match (released slots are never aliased)
//! 3. the stored value must have type `T`

use crate::error::{Error, ErrorKind};
use crate::types::ContextId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A reference to a value owned by a specific context.
///
/// The value itself never leaves its owner, so `RemoteReference<T>` is
/// `Send + Sync` for any `T`.
pub struct RemoteReference<T> {
    owner: ContextId,
    key: usize,
    generation: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RemoteReference<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RemoteReference<T> {}

impl<T> fmt::Debug for RemoteReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteReference")
            .field("owner", &self.owner)
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<T> PartialEq for RemoteReference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.key == other.key && self.generation == other.generation
    }
}

impl<T> Eq for RemoteReference<T> {}

impl<T> Hash for RemoteReference<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.key.hash(state);
        self.generation.hash(state);
    }
}

impl<T> RemoteReference<T> {
    pub(crate) const fn new(owner: ContextId, key: usize, generation: u64) -> Self {
        Self {
            owner,
            key,
            generation,
            _marker: PhantomData,
        }
    }

    /// Returns the context that owns the referenced value.
    #[must_use]
    pub const fn owner(&self) -> ContextId {
        self.owner
    }

    pub(crate) const fn key(&self) -> usize {
        self.key
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Error returned when accessing a remote reference fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteRefError {
    /// The reference was used from a context other than its owner.
    #[error("remote reference owned by {expected} used from {actual}")]
    WrongContext {
        /// The owning context.
        expected: ContextId,
        /// The context the access was attempted from.
        actual: ContextId,
    },
    /// The value was released (or its owner discarded it).
    #[error("remote reference is no longer valid")]
    Released,
    /// The value is already borrowed by an enclosing access.
    #[error("remote value is already in use")]
    InUse,
    /// The stored value has a different type.
    #[error("remote value has a different type")]
    TypeMismatch,
}

impl From<RemoteRefError> for Error {
    fn from(err: RemoteRefError) -> Self {
        let kind = match err {
            RemoteRefError::TypeMismatch => ErrorKind::TypeMismatch,
            _ => ErrorKind::InvalidReference,
        };
        Self::new(kind).with_message(err.to_string())
    }
}
