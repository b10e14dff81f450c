//! Cheap, copyable per-thread identity.
//!
//! `std::thread::ThreadId` is opaque and cannot live in an atomic, which the
//! lock-free slot scans in the queue pool and the channel bucket tables
//! require. A `ThreadKey` is a process-unique `u64` handed out lazily to
//! each thread; zero is reserved as the "vacant slot" sentinel.

use core::fmt;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
  static CURRENT_KEY: Cell<u64> = const { Cell::new(0) };
}

/// Identity of an OS thread as seen by this library.
///
/// Obtained with [`ThreadKey::current`]; pass it across threads to target a
/// specific pump (e.g. [`crate::invoke::call_on`]).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ThreadKey(u64);

impl ThreadKey {
  /// The key of the calling thread, assigned on first use.
  pub fn current() -> Self {
    CURRENT_KEY.with(|cell| {
      let mut key = cell.get();
      if key == 0 {
        key = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        cell.set(key);
      }
      ThreadKey(key)
    })
  }

  pub(crate) fn as_u64(self) -> u64 {
    self.0
  }
}

impl fmt::Display for ThreadKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "thread#{}", self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn stable_within_a_thread() {
    assert_eq!(ThreadKey::current(), ThreadKey::current());
  }

  #[test]
  fn distinct_across_threads() {
    let here = ThreadKey::current();
    let there = thread::spawn(ThreadKey::current).join().unwrap();
    assert_ne!(here, there);
  }
}
