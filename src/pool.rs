// src/pool.rs

//! Process-wide registry of receive ports, keyed by thread.
//!
//! Every queue end created by a channel (or the one-shot invoker) is
//! registered here under the thread that owns it. A thread that wants to
//! receive drives [`process_events`] periodically; that is the only point
//! at which its ports are drained. The library never spawns threads and
//! never steals work.
//!
//! The slot table is fixed at [`MAX_THREADS`](crate::config::MAX_THREADS)
//! entries. Slots are claimed under an allocation mutex and found again by
//! a lock-free scan of their atomic thread keys; a slot whose port list has
//! drained to empty may be re-claimed for a new thread, but slots are never
//! recycled while ports remain.

use crate::config::MAX_THREADS;
use crate::error::PoolExhausted;
use crate::spsc::{same_port, PumpPort};
use crate::thread_key::ThreadKey;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

static POOL: Lazy<QueuePool> = Lazy::new(|| QueuePool::new(MAX_THREADS));

/// Drains every port registered for the calling thread, in registration
/// order. Returns immediately if another thread is mid-mutation of the
/// calling thread's port list.
pub fn process_events() {
  QueuePool::instance().process(ThreadKey::current());
}

struct PoolSlot {
  // 0 = vacant. Written under the allocation mutex, read lock-free.
  thread_key: AtomicU64,
  ports: Mutex<Vec<Arc<dyn PumpPort>>>,
}

pub(crate) struct QueuePool {
  slots: Box<[PoolSlot]>,
  // High-water mark of claimed slots; scans never look past it.
  claimed: AtomicUsize,
  alloc: Mutex<()>,
}

impl QueuePool {
  pub(crate) fn instance() -> &'static QueuePool {
    &POOL
  }

  fn new(capacity: usize) -> Self {
    let mut slots = Vec::with_capacity(capacity);
    for _ in 0..capacity {
      slots.push(PoolSlot {
        thread_key: AtomicU64::new(0),
        ports: Mutex::new(Vec::new()),
      });
    }
    QueuePool {
      slots: slots.into_boxed_slice(),
      claimed: AtomicUsize::new(0),
      alloc: Mutex::new(()),
    }
  }

  /// Registers `port` under `th`, claiming a slot on first use.
  pub(crate) fn register(&self, th: ThreadKey, port: Arc<dyn PumpPort>) -> Result<(), PoolExhausted> {
    let claimed = self.claimed.load(Ordering::Acquire);
    for slot in &self.slots[..claimed] {
      if slot.thread_key.load(Ordering::Acquire) == th.as_u64() {
        let mut ports = slot.ports.lock();
        // Re-check under the port lock: a drained slot may have been
        // re-targeted to another thread between the scan and the lock.
        if slot.thread_key.load(Ordering::Acquire) == th.as_u64() {
          ports.push(port);
          trace!(thread = %th, "registered port in existing slot");
          return Ok(());
        }
        break;
      }
    }

    let _guard = self.alloc.lock();

    // Another thread may have claimed a slot for `th` while we waited.
    let claimed = self.claimed.load(Ordering::Acquire);
    for slot in &self.slots[..claimed] {
      if slot.thread_key.load(Ordering::Acquire) == th.as_u64() {
        slot.ports.lock().push(port);
        return Ok(());
      }
    }

    // A slot whose ports have all been unregistered can serve a new thread.
    for slot in &self.slots[..claimed] {
      let mut ports = slot.ports.lock();
      if ports.is_empty() {
        slot.thread_key.store(th.as_u64(), Ordering::Release);
        ports.push(port);
        debug!(thread = %th, "re-claimed a vacated pool slot");
        return Ok(());
      }
    }

    if claimed == self.slots.len() {
      return Err(PoolExhausted {
        capacity: self.slots.len(),
      });
    }

    let slot = &self.slots[claimed];
    slot.ports.lock().push(port);
    slot.thread_key.store(th.as_u64(), Ordering::Release);
    self.claimed.store(claimed + 1, Ordering::Release);
    debug!(thread = %th, slot = claimed, "claimed pool slot");
    Ok(())
  }

  /// Removes a single occurrence of `port` from `th`'s slot.
  pub(crate) fn unregister(&self, th: ThreadKey, port: &Arc<dyn PumpPort>) {
    let claimed = self.claimed.load(Ordering::Acquire);
    for slot in &self.slots[..claimed] {
      if slot.thread_key.load(Ordering::Acquire) != th.as_u64() {
        continue;
      }
      let mut ports = slot.ports.lock();
      if let Some(pos) = ports.iter().position(|p| same_port(p, port)) {
        ports.remove(pos);
        trace!(thread = %th, remaining = ports.len(), "unregistered port");
      }
      return;
    }
  }

  /// Drains the ports registered under `th`.
  ///
  /// Only ever called by `th` itself (via [`process_events`]). The port
  /// list lock is re-acquired per port so handlers are free to register or
  /// unregister ports mid-pump; ports added during the pump are picked up
  /// on the next one.
  pub(crate) fn process(&self, th: ThreadKey) {
    let claimed = self.claimed.load(Ordering::Acquire);
    for slot in &self.slots[..claimed] {
      if slot.thread_key.load(Ordering::Acquire) != th.as_u64() {
        continue;
      }
      let mut index = 0;
      loop {
        let port = {
          let Some(ports) = slot.ports.try_lock() else {
            // Another thread is mutating the list; skip this pump.
            return;
          };
          // Re-targeting a vacated slot stores the new key under the port
          // lock, so the key must be re-checked here: a stale match would
          // drain ports that now belong to another thread.
          if slot.thread_key.load(Ordering::Acquire) != th.as_u64() {
            return;
          }
          match ports.get(index) {
            Some(port) => port.clone(),
            None => break,
          }
        };
        port.process();
        index += 1;
      }
      return;
    }
  }
}

impl fmt::Debug for QueuePool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueuePool")
      .field("capacity", &self.slots.len())
      .field("claimed", &self.claimed.load(Ordering::Relaxed))
      .finish()
  }
}
