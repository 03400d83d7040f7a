//! Context-owned value storage.
//!
//! Every context owns a slab of type-erased values. A value is reachable
//! only through a [`RemoteReference`] and only while the accessor holds a
//! [`Scope`] entered on the owning context. Each slot carries a generation
//! so that a released key, once reused, never aliases the old reference.
//!
//! During access the value is moved out of its slot and put back when the
//! closure returns (or unwinds). A reentrant access to the same value in
//! the meantime observes [`RemoteRefError::InUse`].

use crate::error::Result;
use crate::runtime::{ContextHandle, ScheduleOptions, Scope, task::task_fn};
use crate::types::{RemoteRefError, RemoteReference};
use parking_lot::Mutex;
use slab::Slab;
use std::any::Any;

type Value = Box<dyn Any + Send>;

struct Slot {
    generation: u64,
    value: Option<Value>,
}

#[derive(Default)]
struct Slots {
    entries: Slab<Slot>,
    next_generation: u64,
}

/// Slab of values owned by one context.
#[derive(Default)]
pub(crate) struct Heap {
    slots: Mutex<Slots>,
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap").field("len", &self.len()).finish()
    }
}

impl Heap {
    pub(crate) fn insert(&self, value: Value) -> (usize, u64) {
        let mut slots = self.slots.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;
        let key = slots.entries.insert(Slot {
            generation,
            value: Some(value),
        });
        (key, generation)
    }

    fn take(&self, key: usize, generation: u64) -> std::result::Result<Value, RemoteRefError> {
        let mut slots = self.slots.lock();
        let slot = match slots.entries.get_mut(key) {
            Some(slot) if slot.generation == generation => slot,
            _ => return Err(RemoteRefError::Released),
        };
        slot.value.take().ok_or(RemoteRefError::InUse)
    }

    /// Puts a borrowed value back. If the slot went away meanwhile (the
    /// owner was disposed), the value is handed back to be dropped.
    fn restore(&self, key: usize, generation: u64, value: Value) -> Option<Value> {
        let mut slots = self.slots.lock();
        match slots.entries.get_mut(key) {
            Some(slot) if slot.generation == generation && slot.value.is_none() => {
                slot.value = Some(value);
                None
            }
            _ => Some(value),
        }
    }

    fn remove<T: 'static>(
        &self,
        key: usize,
        generation: u64,
    ) -> std::result::Result<Box<T>, RemoteRefError> {
        let mut slots = self.slots.lock();
        match slots.entries.get(key) {
            Some(slot) if slot.generation == generation => match &slot.value {
                None => return Err(RemoteRefError::InUse),
                Some(value) if !value.is::<T>() => return Err(RemoteRefError::TypeMismatch),
                Some(_) => {}
            },
            _ => return Err(RemoteRefError::Released),
        }
        slots
            .entries
            .remove(key)
            .value
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or(RemoteRefError::TypeMismatch)
    }

    fn contains(&self, key: usize, generation: u64) -> bool {
        self.slots
            .lock()
            .entries
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
    }

    /// Removes every value. The caller drops them outside the lock.
    pub(crate) fn clear(&self) -> Vec<Value> {
        let mut slots = self.slots.lock();
        slots
            .entries
            .drain()
            .filter_map(|slot| slot.value)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }
}

/// Restores a borrowed value on drop, including during unwinding.
struct Borrowed<'a> {
    heap: &'a Heap,
    key: usize,
    generation: u64,
    value: Option<Value>,
}

impl Drop for Borrowed<'_> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            drop(self.heap.restore(self.key, self.generation, value));
        }
    }
}

impl<T: Send + 'static> RemoteReference<T> {
    fn check_owner(&self, scope: &Scope) -> std::result::Result<(), RemoteRefError> {
        let actual = scope.context_id();
        if actual == self.owner() {
            Ok(())
        } else {
            Err(RemoteRefError::WrongContext {
                expected: self.owner(),
                actual,
            })
        }
    }

    fn borrow<'a>(&self, scope: &'a Scope) -> std::result::Result<Borrowed<'a>, RemoteRefError> {
        self.check_owner(scope)?;
        let heap = scope.heap();
        let value = heap.take(self.key(), self.generation())?;
        let borrowed = Borrowed {
            heap,
            key: self.key(),
            generation: self.generation(),
            value: Some(value),
        };
        if borrowed.value.as_ref().is_some_and(|v| v.is::<T>()) {
            Ok(borrowed)
        } else {
            Err(RemoteRefError::TypeMismatch)
        }
    }

    /// Runs `f` with a shared reference to the value.
    pub fn with<R>(&self, scope: &Scope, f: impl FnOnce(&T) -> R) -> Result<R> {
        let borrowed = self.borrow(scope)?;
        let value = borrowed
            .value
            .as_ref()
            .and_then(|v| v.downcast_ref::<T>())
            .ok_or(RemoteRefError::TypeMismatch)?;
        Ok(f(value))
    }

    /// Runs `f` with a mutable reference to the value.
    pub fn with_mut<R>(&self, scope: &Scope, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut borrowed = self.borrow(scope)?;
        let value = borrowed
            .value
            .as_mut()
            .and_then(|v| v.downcast_mut::<T>())
            .ok_or(RemoteRefError::TypeMismatch)?;
        Ok(f(value))
    }

    /// Returns a clone of the value.
    pub fn get(&self, scope: &Scope) -> Result<T>
    where
        T: Clone,
    {
        self.with(scope, T::clone)
    }

    /// Returns true if the value is still stored in its owner.
    ///
    /// Always false from a scope of another context.
    #[must_use]
    pub fn is_live(&self, scope: &Scope) -> bool {
        self.check_owner(scope).is_ok() && scope.heap().contains(self.key(), self.generation())
    }

    /// Removes the value from its owner and returns it.
    pub fn release(self, scope: &Scope) -> Result<T> {
        self.check_owner(scope)?;
        let value = scope.heap().remove::<T>(self.key(), self.generation())?;
        Ok(*value)
    }

    /// Schedules release of the value on its owner, from any context.
    ///
    /// The release runs as a handle task, ahead of the owner's regular
    /// work. Does nothing if the owner is already gone.
    pub fn release_from(self, owner: &ContextHandle) {
        if owner.id() != self.owner() {
            crate::tracing_compat::warn!(
                owner = %self.owner(),
                handle = %owner.id(),
                "release_from called with a handle for another context"
            );
            return;
        }
        owner.schedule(
            task_fn(move |scope| {
                if let Err(err) = self.release(scope) {
                    crate::tracing_compat::debug!(error = %err, "remote value already released");
                }
            }),
            ScheduleOptions::default().handle_task(true),
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{init_test_logging, test_manual_driver};
    use crate::{ErrorKind, RemoteReference};

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn alloc_read_write_release() {
        init_test("alloc_read_write_release");
        let driver = test_manual_driver("heap-basic");
        driver
            .enter(|scope| {
                let value = scope.alloc(vec![1, 2, 3]);
                let len = value.with(scope, Vec::len).expect("with");
                assert_eq!(len, 3);
                value.with_mut(scope, |v| v.push(4)).expect("with_mut");
                assert_eq!(value.get(scope).expect("get"), vec![1, 2, 3, 4]);
                assert!(value.is_live(scope));

                let taken = value.release(scope).expect("release");
                assert_eq!(taken, vec![1, 2, 3, 4]);
                assert!(!value.is_live(scope));
                crate::assert_err_kind!(value.get(scope), ErrorKind::InvalidReference);
            })
            .expect("enter");
        crate::test_complete!("alloc_read_write_release");
    }

    #[test]
    fn reused_key_does_not_alias_released_reference() {
        init_test("reused_key_does_not_alias_released_reference");
        let driver = test_manual_driver("heap-generation");
        driver
            .enter(|scope| {
                let first = scope.alloc(1u32);
                first.release(scope).expect("release");
                let second = scope.alloc(2u32);
                assert_eq!(second.get(scope).expect("second"), 2);
                crate::assert_err_kind!(first.get(scope), ErrorKind::InvalidReference);
            })
            .expect("enter");
        crate::test_complete!("reused_key_does_not_alias_released_reference");
    }

    #[test]
    fn reentrant_access_reports_in_use() {
        init_test("reentrant_access_reports_in_use");
        let driver = test_manual_driver("heap-reentrant");
        driver
            .enter(|scope| {
                let value = scope.alloc(String::from("outer"));
                let inner = value
                    .with(scope, |_| value.get(scope))
                    .expect("outer access");
                crate::assert_err_kind!(inner, ErrorKind::InvalidReference);
                assert_eq!(value.get(scope).expect("restored"), "outer");
            })
            .expect("enter");
        crate::test_complete!("reentrant_access_reports_in_use");
    }

    #[test]
    fn value_restored_after_panic_in_accessor() {
        init_test("value_restored_after_panic_in_accessor");
        let driver = test_manual_driver("heap-panic");
        driver
            .enter(|scope| {
                let value = scope.alloc(7u64);
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    value.with(scope, |_| panic!("accessor failed"))
                }));
                assert!(result.is_err());
                assert_eq!(value.get(scope).expect("restored"), 7);
            })
            .expect("enter");
        crate::test_complete!("value_restored_after_panic_in_accessor");
    }

    #[test]
    fn foreign_scope_is_rejected() {
        init_test("foreign_scope_is_rejected");
        let owner = test_manual_driver("heap-owner");
        let other = test_manual_driver("heap-other");
        let value = owner.enter(|scope| scope.alloc(5i32)).expect("enter owner");
        other
            .enter(|scope| {
                crate::assert_err_kind!(value.get(scope), ErrorKind::InvalidReference);
                assert!(!value.is_live(scope));
            })
            .expect("enter other");
        crate::test_complete!("foreign_scope_is_rejected");
    }

    #[test]
    fn wrong_type_is_a_type_mismatch() {
        init_test("wrong_type_is_a_type_mismatch");
        let driver = test_manual_driver("heap-type");
        driver
            .enter(|scope| {
                let value = scope.alloc(5i32);
                let forged: RemoteReference<String> =
                    RemoteReference::new(value.owner(), value.key(), value.generation());
                crate::assert_err_kind!(forged.get(scope), ErrorKind::TypeMismatch);
                assert_eq!(value.get(scope).expect("untouched"), 5);
            })
            .expect("enter");
        crate::test_complete!("wrong_type_is_a_type_mismatch");
    }

    #[test]
    fn release_from_runs_as_handle_task() {
        init_test("release_from_runs_as_handle_task");
        let driver = test_manual_driver("heap-release-from");
        let value = driver.enter(|scope| scope.alloc(9u8)).expect("enter");
        value.release_from(&driver.handle());
        assert_eq!(driver.run_pending(), 1);
        driver
            .enter(|scope| assert!(!value.is_live(scope)))
            .expect("enter");
        assert_eq!(driver.handle().stats().map(|s| s.handle_tasks_run), Some(1));
        crate::test_complete!("release_from_runs_as_handle_task");
    }
}
