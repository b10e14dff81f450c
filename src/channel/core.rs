// src/channel/core.rs

//! The shared state behind every [`Channel`](crate::Channel) handle: the
//! multi-threaded fan-out engine.
//!
//! Receivers are grouped into per-connect-thread buckets. A bucket's
//! receiver list is mutated only by its owning thread; every other thread
//! reaches it through a bounded SPSC queue drained by that thread's pump.
//! Add/remove during a callback iteration is staged in pending lists and
//! applied at the iteration boundaries, which makes re-entrant sends and
//! self-disconnects safe without locks on the hot path.

use crate::asyncable::{AsyncKey, Asyncable, AsyncableState, Disconnectable};
use crate::config::{MAX_THREADS_PER_CHANNEL, QUEUE_CAPACITY};
use crate::pool::QueuePool;
use crate::spsc::{self, PumpPort, RecvPort, SendPort};
use crate::thread_key::ThreadKey;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// How a value is routed to receivers, relative to the sending thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
  /// Receivers on the sending thread are invoked synchronously, in line;
  /// every other thread is reached through its queue.
  #[default]
  Auto,
  /// Every receiver is reached through a queue, including those on the
  /// sending thread (which then observe the value on their next pump).
  Queue,
}

/// What happens when an owner subscribes to a channel it is already
/// subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectMode {
  /// Keep the existing callback; the new subscription is ignored.
  #[default]
  SetOnce,
  /// Replace the existing callback with the new one.
  SetRepeat,
}

pub(crate) type Callback<T> = Box<dyn Fn(&T) + Send>;

/// Weak back reference from a receiver record to its owner's anchor.
struct OwnerRef {
  key: AsyncKey,
  state: Weak<AsyncableState>,
}

struct ReceiverRec<T> {
  enabled: bool,
  owner: Option<OwnerRef>,
  callback: Callback<T>,
}

impl<T> ReceiverRec<T> {
  fn owned_by(&self, key: AsyncKey) -> bool {
    self.owner.as_ref().is_some_and(|o| o.key == key)
  }
}

/// Message crossing a (sender thread, receive thread) queue.
enum BucketMsg<T> {
  /// Fan the value out to the receive thread's enabled receivers.
  Deliver(T),
  /// Remove the owner's receiver on its connect thread. Routing the
  /// removal through the same FIFO as deliveries is what orders it after
  /// the sends that preceded it.
  Disconnect(AsyncKey),
}

struct OutQueue<T> {
  receive_thread: ThreadKey,
  send: Arc<SendPort<BucketMsg<T>>>,
  recv: Arc<RecvPort<BucketMsg<T>>>,
}

struct BucketState<T> {
  receivers: Vec<Box<ReceiverRec<T>>>,
  pending_add: Vec<Box<ReceiverRec<T>>>,
  pending_remove: Vec<AsyncKey>,
  iterating: bool,
  out_queues: Vec<OutQueue<T>>,
}

/// Per-connect-thread storage. The cell is only ever touched on
/// `thread_key`'s thread (channel destruction excepted, where `&mut`
/// access proves exclusivity), which is what makes the `Sync` impl sound.
struct ThreadBucket<T> {
  thread_key: ThreadKey,
  state: UnsafeCell<BucketState<T>>,
}

unsafe impl<T: Send> Sync for ThreadBucket<T> {}

impl<T: Clone + Send + 'static> ThreadBucket<T> {
  fn new(thread_key: ThreadKey) -> Self {
    ThreadBucket {
      thread_key,
      state: UnsafeCell::new(BucketState {
        receivers: Vec::new(),
        pending_add: Vec::new(),
        pending_remove: Vec::new(),
        iterating: false,
        out_queues: Vec::new(),
      }),
    }
  }

  /// Raw access to the bucket state. Callers must be on the owning thread.
  fn state_ptr(&self) -> *mut BucketState<T> {
    debug_assert_eq!(
      self.thread_key,
      ThreadKey::current(),
      "bucket state touched from a foreign thread"
    );
    self.state.get()
  }

  fn push_receiver(&self, rec: Box<ReceiverRec<T>>) {
    let st = self.state_ptr();
    unsafe {
      if (*st).iterating {
        (*st).pending_add.push(rec);
      } else {
        (*st).receivers.push(rec);
      }
    }
  }

  /// Invokes every enabled receiver with `value`, in insertion order.
  ///
  /// Receivers added from inside a callback do not observe this value;
  /// receivers disabled from inside a callback stop firing immediately.
  /// Nested calls (a callback sending on its own channel) iterate the same
  /// stable snapshot; the pending lists are applied only at the outermost
  /// boundaries.
  fn receivers_call(&self, value: &T) {
    let st = self.state_ptr();
    unsafe {
      let outer = (*st).iterating;
      if !outer {
        Self::apply_pending(&mut *st);
      }
      (*st).iterating = true;
      let count = (*st).receivers.len();
      for i in 0..count {
        // Raw pointer into the boxed record: the receivers vec is not
        // restructured while `iterating` is set, and the box keeps the
        // record address stable regardless.
        let rec: *const ReceiverRec<T> = &*(&(*st).receivers)[i];
        if (*rec).enabled {
          ((*rec).callback)(value);
        }
      }
      (*st).iterating = outer;
      if !outer {
        Self::apply_pending(&mut *st);
      }
    }
  }

  fn apply_pending(st: &mut BucketState<T>) {
    if !st.pending_remove.is_empty() {
      for key in std::mem::take(&mut st.pending_remove) {
        st.receivers.retain(|r| !r.owned_by(key));
      }
    }
    if !st.pending_add.is_empty() {
      st.receivers.append(&mut st.pending_add);
    }
  }
}

/// Reference-counted channel state. Created through [`ChannelCore::new`]
/// so queue handlers can hold a weak self reference; once the last handle
/// drops, in-flight drains for this channel degrade to no-ops.
pub(crate) struct ChannelCore<T: Clone + Send + 'static> {
  me: Weak<ChannelCore<T>>,
  buckets: Box<[OnceCell<ThreadBucket<T>>]>,
  // Monotonic count of claimed bucket slots; scans never look past it.
  bucket_count: AtomicUsize,
  alloc: Mutex<()>,
  enabled_receivers: AtomicUsize,
  close: OnceCell<Arc<ChannelCore<()>>>,
}

impl<T: Clone + Send + 'static> ChannelCore<T> {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new_cyclic(|me| {
      let mut buckets = Vec::with_capacity(MAX_THREADS_PER_CHANNEL);
      for _ in 0..MAX_THREADS_PER_CHANNEL {
        buckets.push(OnceCell::new());
      }
      ChannelCore {
        me: me.clone(),
        buckets: buckets.into_boxed_slice(),
        bucket_count: AtomicUsize::new(0),
        alloc: Mutex::new(()),
        enabled_receivers: AtomicUsize::new(0),
        close: OnceCell::new(),
      }
    })
  }

  /// Identity of this core, stable for its lifetime.
  pub(crate) fn key(&self) -> usize {
    self as *const Self as usize
  }

  /// True while any receiver is enabled.
  pub(crate) fn is_connected(&self) -> bool {
    self.enabled_receivers.load(Ordering::Acquire) > 0
  }

  #[cfg(test)]
  pub(crate) fn enabled_count(&self) -> usize {
    self.enabled_receivers.load(Ordering::Acquire)
  }

  /// The lazily-built close sub-channel.
  pub(crate) fn close_core(&self) -> &Arc<ChannelCore<()>> {
    self.close.get_or_init(ChannelCore::new)
  }

  fn bucket_lookup(&self, th: ThreadKey) -> Option<&ThreadBucket<T>> {
    let count = self.bucket_count.load(Ordering::Acquire);
    self.buckets[..count]
      .iter()
      .filter_map(|slot| slot.get())
      .find(|bucket| bucket.thread_key == th)
  }

  /// Finds the bucket for `th`, claiming a fresh slot on first use.
  fn bucket_for(&self, th: ThreadKey) -> &ThreadBucket<T> {
    if let Some(bucket) = self.bucket_lookup(th) {
      return bucket;
    }

    let _guard = self.alloc.lock();
    if let Some(bucket) = self.bucket_lookup(th) {
      return bucket;
    }

    let count = self.bucket_count.load(Ordering::Acquire);
    if count == self.buckets.len() {
      error!(
        channel = self.key(),
        capacity = self.buckets.len(),
        "channel thread slots exhausted"
      );
      panic!(
        "channel thread slots exhausted (capacity {})",
        self.buckets.len()
      );
    }
    let bucket = self.buckets[count].get_or_init(|| ThreadBucket::new(th));
    self.bucket_count.store(count + 1, Ordering::Release);
    debug!(channel = self.key(), thread = %th, slot = count, "claimed channel bucket");
    bucket
  }

  /// Records a subscription on the current thread.
  pub(crate) fn on_receive(
    &self,
    owner: Option<&Asyncable>,
    callback: Callback<T>,
    mode: ConnectMode,
  ) {
    let th = ThreadKey::current();

    if let Some(owner) = owner {
      if let Some(prev_th) = owner.connect_thread(self.key()) {
        match mode {
          ConnectMode::SetOnce => {
            warn!(
              channel = self.key(),
              "owner already subscribed; keeping the existing callback"
            );
            return;
          }
          ConnectMode::SetRepeat => {
            if prev_th == th {
              if let Some(bucket) = self.bucket_lookup(th) {
                self.disconnect_local(bucket, owner.key());
              }
            } else {
              owner.async_disconnect(self.key());
              self.route_disconnect(prev_th, owner.key());
            }
          }
        }
      }
    }

    let bucket = self.bucket_for(th);
    bucket.push_receiver(Box::new(ReceiverRec {
      enabled: true,
      owner: owner.map(|a| OwnerRef {
        key: a.key(),
        state: a.downgrade(),
      }),
      callback,
    }));
    self.enabled_receivers.fetch_add(1, Ordering::AcqRel);

    if let Some(owner) = owner {
      let target = self.me.clone() as Weak<dyn Disconnectable>;
      owner.async_connect(self.key(), target, th);
    }
  }

  /// Fans `value` out to every receiver, per `mode`.
  ///
  /// A send with no enabled receivers returns without touching buckets or
  /// queues. Same-thread dispatch (in `Auto` mode) completes before any
  /// cross-thread message is enqueued.
  pub(crate) fn send(&self, mode: SendMode, value: T) {
    if !self.is_connected() {
      return;
    }

    let th = ThreadKey::current();
    let sender_bucket = self.bucket_for(th);

    if mode == SendMode::Auto {
      sender_bucket.receivers_call(&value);
    }

    let count = self.bucket_count.load(Ordering::Acquire);
    for slot in &self.buckets[..count] {
      let Some(bucket) = slot.get() else { continue };
      if bucket.thread_key == th {
        if mode == SendMode::Queue {
          self.send_to_queue(sender_bucket, th, BucketMsg::Deliver(value.clone()));
        }
        continue;
      }
      self.send_to_queue(
        sender_bucket,
        bucket.thread_key,
        BucketMsg::Deliver(value.clone()),
      );
    }
  }

  /// Removes `owner`'s subscription.
  ///
  /// On the connect thread this takes effect before returning (deferred to
  /// the iteration boundary when called from inside a callback). From any
  /// other thread the removal is routed through the queue to the connect
  /// thread, ordered after every value already sent from here.
  pub(crate) fn disconnect(&self, owner: &Asyncable) {
    let Some(connect_th) = owner.connect_thread(self.key()) else {
      return;
    };
    let th = ThreadKey::current();
    if connect_th == th {
      if let Some(bucket) = self.bucket_lookup(th) {
        self.disconnect_local(bucket, owner.key());
      }
      owner.async_disconnect(self.key());
    } else {
      owner.async_disconnect(self.key());
      self.route_disconnect(connect_th, owner.key());
    }
  }

  /// Looks up (or creates) the out-queue from the sender bucket to
  /// `receive_th` and enqueues `msg` on it. New queues register both ends
  /// with the pool: the send end under the sender thread, the receive end
  /// under the receiving thread.
  fn send_to_queue(&self, sender_bucket: &ThreadBucket<T>, receive_th: ThreadKey, msg: BucketMsg<T>) {
    let st = sender_bucket.state_ptr();
    let send_port = unsafe {
      match (*st)
        .out_queues
        .iter()
        .find(|q| q.receive_thread == receive_th)
      {
        Some(queue) => queue.send.clone(),
        None => {
          let (send, recv) = spsc::queue(QUEUE_CAPACITY);
          let weak = self.me.clone();
          recv.on_message(move |msg| {
            if let Some(core) = weak.upgrade() {
              core.handle_incoming(msg);
            }
          });
          register_port(sender_bucket.thread_key, send.clone());
          register_port(receive_th, recv.clone());
          (*st).out_queues.push(OutQueue {
            receive_thread: receive_th,
            send: send.clone(),
            recv,
          });
          send
        }
      }
    };
    send_port.send(msg);
  }

  /// Runs on the receive thread when its pump drains one of our queues.
  fn handle_incoming(&self, msg: BucketMsg<T>) {
    let th = ThreadKey::current();
    let Some(bucket) = self.bucket_lookup(th) else {
      return;
    };
    match msg {
      BucketMsg::Deliver(value) => bucket.receivers_call(&value),
      BucketMsg::Disconnect(key) => self.disconnect_local(bucket, key),
    }
  }

  fn route_disconnect(&self, connect_th: ThreadKey, key: AsyncKey) {
    let sender_bucket = self.bucket_for(ThreadKey::current());
    self.send_to_queue(sender_bucket, connect_th, BucketMsg::Disconnect(key));
  }

  /// Removes (or, mid-iteration, disables and defers) the owner's receiver
  /// in a bucket owned by the current thread.
  fn disconnect_local(&self, bucket: &ThreadBucket<T>, key: AsyncKey) {
    let st = bucket.state_ptr();
    unsafe {
      if (*st).iterating {
        let mut disabled = false;
        for rec in (*st).receivers.iter_mut() {
          if rec.owned_by(key) && rec.enabled {
            rec.enabled = false;
            disabled = true;
          }
        }
        if disabled {
          (*st).pending_remove.push(key);
          self.dec_enabled();
        }
        // A record still waiting in pending_add was never iterated; it can
        // go directly.
        let before = (*st).pending_add.len();
        (*st).pending_add.retain(|r| !r.owned_by(key));
        for _ in (*st).pending_add.len()..before {
          self.dec_enabled();
        }
      } else if let Some(pos) = (*st).receivers.iter().position(|r| r.owned_by(key)) {
        let rec = (*st).receivers.remove(pos);
        if rec.enabled {
          self.dec_enabled();
        }
      }
    }
  }

  fn dec_enabled(&self) {
    let prev = self.enabled_receivers.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(prev > 0, "enabled receiver count underflow");
  }
}

impl<T: Clone + Send + 'static> Disconnectable for ChannelCore<T> {
  fn disconnect_asyncable(&self, owner: AsyncKey, connect_thread: ThreadKey) {
    let th = ThreadKey::current();
    if connect_thread == th {
      if let Some(bucket) = self.bucket_lookup(th) {
        self.disconnect_local(bucket, owner);
      }
    } else {
      self.route_disconnect(connect_thread, owner);
    }
  }
}

impl<T: Clone + Send + 'static> Drop for ChannelCore<T> {
  fn drop(&mut self) {
    let pool = QueuePool::instance();
    let count = *self.bucket_count.get_mut();
    let key = self.key();
    for slot in &self.buckets[..count] {
      let Some(bucket) = slot.get() else { continue };
      // `&mut self` proves exclusive access; the owning-thread protocol no
      // longer applies.
      let st = unsafe { &mut *bucket.state.get() };
      for queue in st.out_queues.drain(..) {
        pool.unregister(bucket.thread_key, &(queue.send.clone() as Arc<dyn PumpPort>));
        pool.unregister(
          queue.receive_thread,
          &(queue.recv.clone() as Arc<dyn PumpPort>),
        );
        // An in-flight drain that raced the unregister finds no handler.
        queue.recv.clear_handler();
      }
      for rec in st.receivers.drain(..).chain(st.pending_add.drain(..)) {
        if let Some(owner) = rec.owner {
          if let Some(state) = owner.state.upgrade() {
            state.forget_channel(key);
          }
        }
      }
    }
    debug!(channel = key, "channel core destroyed");
  }
}

fn register_port(th: ThreadKey, port: Arc<dyn PumpPort>) {
  if let Err(err) = QueuePool::instance().register(th, port) {
    error!(thread = %th, %err, "queue pool exhausted");
    panic!("{err}");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn noop<T>() -> Callback<T> {
    Box::new(|_| {})
  }

  #[test]
  fn enabled_count_tracks_subscriptions() {
    let core = ChannelCore::<i32>::new();
    let owner = Asyncable::new();

    assert_eq!(core.enabled_count(), 0);
    assert!(!core.is_connected());

    core.on_receive(Some(&owner), noop(), ConnectMode::SetOnce);
    core.on_receive(None, noop(), ConnectMode::SetOnce);
    assert_eq!(core.enabled_count(), 2);
    assert!(core.is_connected());

    core.disconnect(&owner);
    assert_eq!(core.enabled_count(), 1);

    // The anonymous receiver has no owner to disconnect through; it keeps
    // the channel connected.
    assert!(core.is_connected());
  }

  #[test]
  fn set_once_keeps_the_first_callback_and_count() {
    let core = ChannelCore::<i32>::new();
    let owner = Asyncable::new();

    core.on_receive(Some(&owner), noop(), ConnectMode::SetOnce);
    core.on_receive(Some(&owner), noop(), ConnectMode::SetOnce);
    assert_eq!(core.enabled_count(), 1);
  }

  #[test]
  fn set_repeat_replaces_without_leaking_count() {
    let core = ChannelCore::<i32>::new();
    let owner = Asyncable::new();

    core.on_receive(Some(&owner), noop(), ConnectMode::SetRepeat);
    core.on_receive(Some(&owner), noop(), ConnectMode::SetRepeat);
    assert_eq!(core.enabled_count(), 1);

    core.disconnect(&owner);
    assert_eq!(core.enabled_count(), 0);
  }

  #[test]
  fn owner_drop_clears_the_count() {
    let core = ChannelCore::<i32>::new();
    {
      let owner = Asyncable::new();
      core.on_receive(Some(&owner), noop(), ConnectMode::SetOnce);
      assert_eq!(core.enabled_count(), 1);
    }
    assert_eq!(core.enabled_count(), 0);
  }
}
