// src/spsc.rs

//! Bounded single-producer/single-consumer message pipe.
//!
//! A [`queue`] is split into a [`SendPort`] and a [`RecvPort`]. The send
//! half appends messages; the receive half drains them, in arrival order,
//! into a handler installed with [`RecvPort::on_message`], but only when
//! its owning thread calls [`RecvPort::process`] (normally via the queue
//! pool's pump). Handlers are never invoked from the sender side.
//!
//! A full ring is back-pressure, not an error: `send` waits with an
//! adaptive spin/yield/sleep strategy until the consumer catches up.

use crate::internal::cache_padded::CachePadded;
use crate::sync_util;

use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The face a port shows the queue pool: something a pumping thread can
/// drain. The send half implements it as a no-op so both ends of a queue
/// can be registered and unregistered symmetrically.
pub(crate) trait PumpPort: Send + Sync {
  fn process(&self);
}

/// Compares two pool-registered ports by identity.
pub(crate) fn same_port(a: &Arc<dyn PumpPort>, b: &Arc<dyn PumpPort>) -> bool {
  std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Lock-free SPSC ring. Capacity is rounded up to a power of two so index
/// wrapping is a mask.
struct RingBuffer<M> {
  buffer: Box<[UnsafeCell<MaybeUninit<M>>]>,
  capacity: usize,
  mask: usize,
  head: CachePadded<AtomicUsize>, // write index, touched by the producer
  tail: CachePadded<AtomicUsize>, // read index, touched by the consumer
}

// The SPSC protocol (one pushing thread, one popping thread, acquire/release
// publication of the indices) makes the unsynchronised slot accesses safe.
unsafe impl<M: Send> Send for RingBuffer<M> {}
unsafe impl<M: Send> Sync for RingBuffer<M> {}

impl<M> RingBuffer<M> {
  fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "queue capacity must be greater than 0");
    let capacity = capacity.next_power_of_two();
    let mut slots = Vec::with_capacity(capacity);
    for _ in 0..capacity {
      slots.push(UnsafeCell::new(MaybeUninit::uninit()));
    }
    RingBuffer {
      buffer: slots.into_boxed_slice(),
      capacity,
      mask: capacity - 1,
      head: CachePadded::new(AtomicUsize::new(0)),
      tail: CachePadded::new(AtomicUsize::new(0)),
    }
  }

  fn try_push(&self, msg: M) -> Result<(), M> {
    let head = self.head.load(Ordering::Relaxed);
    let tail = self.tail.load(Ordering::Acquire);
    if head.wrapping_sub(tail) >= self.capacity {
      return Err(msg);
    }
    unsafe {
      (*self.buffer[head & self.mask].get()).write(msg);
    }
    self.head.store(head.wrapping_add(1), Ordering::Release);
    Ok(())
  }

  fn try_pop(&self) -> Option<M> {
    let tail = self.tail.load(Ordering::Relaxed);
    let head = self.head.load(Ordering::Acquire);
    if tail == head {
      return None;
    }
    let msg = unsafe { (*self.buffer[tail & self.mask].get()).assume_init_read() };
    self.tail.store(tail.wrapping_add(1), Ordering::Release);
    Some(msg)
  }

  /// Number of messages visible to the consumer right now.
  fn available(&self) -> usize {
    let head = self.head.load(Ordering::Acquire);
    let tail = self.tail.load(Ordering::Relaxed);
    head.wrapping_sub(tail)
  }

  /// Producer-side fullness check, used while backing off.
  fn is_full(&self) -> bool {
    let head = self.head.load(Ordering::Relaxed);
    let tail = self.tail.load(Ordering::Acquire);
    head.wrapping_sub(tail) >= self.capacity
  }
}

impl<M> Drop for RingBuffer<M> {
  fn drop(&mut self) {
    let head = *self.head.get_mut();
    let mut tail = *self.tail.get_mut();
    while tail != head {
      unsafe {
        (*self.buffer[tail & self.mask].get()).assume_init_drop();
      }
      tail = tail.wrapping_add(1);
    }
  }
}

type Handler<M> = Box<dyn Fn(M) + Send>;

struct QueueShared<M> {
  ring: RingBuffer<M>,
  handler: Mutex<Option<Handler<M>>>,
}

/// Creates a bounded SPSC queue and returns its two halves.
pub(crate) fn queue<M: Send + 'static>(capacity: usize) -> (Arc<SendPort<M>>, Arc<RecvPort<M>>) {
  let shared = Arc::new(QueueShared {
    ring: RingBuffer::new(capacity),
    handler: Mutex::new(None),
  });
  (
    Arc::new(SendPort {
      shared: shared.clone(),
    }),
    Arc::new(RecvPort { shared }),
  )
}

/// Producing half of a queue. Owned by exactly one sending thread.
pub(crate) struct SendPort<M> {
  shared: Arc<QueueShared<M>>,
}

impl<M: Send> SendPort<M> {
  /// Appends a message, waiting for space if the ring is full.
  ///
  /// Completion is required for causality: an overflowing message is never
  /// dropped, the sender backs off until the receiving thread drains.
  pub(crate) fn send(&self, msg: M) {
    let mut msg = msg;
    loop {
      match self.shared.ring.try_push(msg) {
        Ok(()) => return,
        Err(back) => {
          msg = back;
          sync_util::wait_until(|| !self.shared.ring.is_full());
        }
      }
    }
  }
}

impl<M: Send> PumpPort for SendPort<M> {
  fn process(&self) {
    // The send half has nothing to drain.
  }
}

impl<M> fmt::Debug for SendPort<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendPort")
      .field("capacity", &self.shared.ring.capacity)
      .finish_non_exhaustive()
  }
}

/// Consuming half of a queue. Drained only by its owning thread's pump.
pub(crate) struct RecvPort<M> {
  shared: Arc<QueueShared<M>>,
}

impl<M: Send> RecvPort<M> {
  /// Installs the handler invoked for each message during [`Self::process`].
  pub(crate) fn on_message<F>(&self, handler: F)
  where
    F: Fn(M) + Send + 'static,
  {
    *self.shared.handler.lock() = Some(Box::new(handler));
  }

  /// Drops the handler; any further drain becomes a no-op.
  ///
  /// If a drain is in progress the handler is left installed rather than
  /// waiting for it (the caller may be inside that very drain), so handlers
  /// must stay safe to run after the object they deliver to is gone.
  pub(crate) fn clear_handler(&self) {
    if let Some(mut handler) = self.shared.handler.try_lock() {
      *handler = None;
    }
  }

  /// Drains the messages available at entry, invoking the handler in
  /// arrival order. Messages enqueued while draining wait for the next
  /// pump, and a re-entrant call from inside a handler returns immediately.
  pub(crate) fn process(&self) {
    self.drain();
  }

  fn drain(&self) {
    let Some(guard) = self.shared.handler.try_lock() else {
      // Already draining on this thread (a handler pumped); the outer
      // drain picks the message up.
      return;
    };
    let Some(handler) = guard.as_ref() else {
      return;
    };
    let available = self.shared.ring.available();
    for _ in 0..available {
      match self.shared.ring.try_pop() {
        Some(msg) => handler(msg),
        None => break,
      }
    }
  }
}

impl<M: Send> PumpPort for RecvPort<M> {
  fn process(&self) {
    self.drain();
  }
}

impl<M> fmt::Debug for RecvPort<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecvPort")
      .field("capacity", &self.shared.ring.capacity)
      .field("available", &self.shared.ring.available())
      .finish_non_exhaustive()
  }
}
