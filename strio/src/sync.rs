//! Poison-free locking.
//!
//! With the `parking_lot` feature the crate locks through
//! `parking_lot::Mutex` directly. The std fallback ignores poisoning:
//! no lock scope in this crate leaves its state partially updated, so
//! a poisoned lock is still coherent.

#[cfg(feature = "parking_lot")]
pub(crate) use parking_lot::Mutex;

#[cfg(not(feature = "parking_lot"))]
pub(crate) use fallback::Mutex;

#[cfg(not(feature = "parking_lot"))]
mod fallback {
  use std::sync::{self, MutexGuard};

  /// `std::sync::Mutex` with poisoning ignored on lock.
  pub struct Mutex<T>(sync::Mutex<T>);

  impl<T> Mutex<T> {
    pub const fn new(value: T) -> Mutex<T> {
      Mutex(sync::Mutex::new(value))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
      match self.0.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
      }
    }
  }
}
