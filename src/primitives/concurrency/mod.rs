#![forbid(unsafe_code)]
//! Single-slot reuse cache for expensive scratch objects.
//!
//! A [`SlotCache`] holds at most one idle value. Checkout never blocks: if
//! the slot is locked or empty the caller gets a freshly built private
//! value instead. On release the value goes back into the slot only when
//! the slot is empty, so at most one value is retained.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Best-effort, non-blocking single-value cache.
#[derive(Debug, Default)]
pub struct SlotCache<T> {
    slot: Mutex<Option<T>>,
}

impl<T> SlotCache<T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Creates a cache holding `value`.
    pub fn with_value(value: T) -> Self {
        Self {
            slot: Mutex::new(Some(value)),
        }
    }

    /// Takes the cached value, or builds a private one with `make` when the
    /// slot is empty or contended.
    pub fn checkout(&self, make: impl FnOnce() -> T) -> SlotGuard<'_, T> {
        let cached = self.slot.try_lock().and_then(|mut slot| slot.take());
        let reused = cached.is_some();
        SlotGuard {
            cache: self,
            value: Some(cached.unwrap_or_else(make)),
            reused,
        }
    }

    /// Whether a value is currently parked in the slot.
    pub fn is_occupied(&self) -> bool {
        self.slot.lock().is_some()
    }

    fn release(&self, value: T) {
        if let Some(mut slot) = self.slot.try_lock() {
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    }
}

/// Exclusive access to a value checked out of a [`SlotCache`].
pub struct SlotGuard<'a, T> {
    cache: &'a SlotCache<T>,
    value: Option<T>,
    reused: bool,
}

impl<'a, T> SlotGuard<'a, T> {
    /// Whether the value came from the cache rather than `make`.
    pub fn reused(&self) -> bool {
        self.reused
    }
}

impl<'a, T> Deref for SlotGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().unwrap_or_else(|| unreachable!("slot guard used after release"))
    }
}

impl<'a, T> DerefMut for SlotGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap_or_else(|| unreachable!("slot guard used after release"))
    }
}

impl<'a, T> Drop for SlotGuard<'a, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.cache.release(value);
        }
    }
}
