// src/asyncable.rs

//! Lifetime anchor for subscribers.
//!
//! Any object that subscribes to a channel owns an [`Asyncable`]. Each
//! subscription records a `(channel, connect thread)` pair here; dropping
//! the anchor walks those pairs and asks each channel to tear the
//! subscription down, so a destroyed receiver can never be called again.
//!
//! The back reference from the anchor to the channel is a weak
//! capability-to-disconnect, not an owning handle; neither side keeps the
//! other alive.

use crate::thread_key::ThreadKey;

use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

/// Identity of an [`Asyncable`], stable for as long as any channel still
/// references it.
pub(crate) type AsyncKey = usize;

/// The capability a channel (or invoker edge) hands to its subscribers'
/// anchors: "drop everything this owner registered on this thread".
pub(crate) trait Disconnectable: Send + Sync {
  fn disconnect_asyncable(&self, owner: AsyncKey, connect_thread: ThreadKey);
}

struct Connection {
  channel_key: usize,
  target: Weak<dyn Disconnectable>,
  thread: ThreadKey,
}

pub(crate) struct AsyncableState {
  connections: Mutex<Vec<Connection>>,
}

impl AsyncableState {
  /// Drops every pair recorded for `channel_key`. Used by a channel being
  /// destroyed, reaching the owner through its weak back reference.
  pub(crate) fn forget_channel(&self, channel_key: usize) {
    self
      .connections
      .lock()
      .retain(|c| c.channel_key != channel_key);
  }
}

/// Lifetime anchor carried by every owned subscription.
///
/// Embed one in any object that subscribes to channels:
///
/// ```
/// use weft::{Asyncable, Channel};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
///
/// struct Display {
///     anchor: Asyncable,
///     value: Arc<AtomicI32>,
/// }
///
/// let ch = Channel::<i32>::new();
/// let display = Display { anchor: Asyncable::new(), value: Arc::new(AtomicI32::new(0)) };
/// let value = display.value.clone();
/// ch.on_receive(Some(&display.anchor), move |v| value.store(*v, Ordering::Relaxed));
///
/// ch.send(7);
/// assert_eq!(display.value.load(Ordering::Relaxed), 7);
///
/// drop(display); // all of the object's subscriptions are revoked
/// assert!(!ch.is_connected());
/// ```
pub struct Asyncable {
  state: Arc<AsyncableState>,
}

impl Asyncable {
  /// Creates an anchor with no connections.
  pub fn new() -> Self {
    Asyncable {
      state: Arc::new(AsyncableState {
        connections: Mutex::new(Vec::new()),
      }),
    }
  }

  /// True while at least one channel holds a subscription for this anchor.
  pub fn has_connections(&self) -> bool {
    !self.state.connections.lock().is_empty()
  }

  pub(crate) fn key(&self) -> AsyncKey {
    Arc::as_ptr(&self.state) as AsyncKey
  }

  pub(crate) fn downgrade(&self) -> Weak<AsyncableState> {
    Arc::downgrade(&self.state)
  }

  /// Records a `(channel, thread)` pair; idempotent per pair.
  pub(crate) fn async_connect(
    &self,
    channel_key: usize,
    target: Weak<dyn Disconnectable>,
    thread: ThreadKey,
  ) {
    let mut connections = self.state.connections.lock();
    if connections
      .iter()
      .any(|c| c.channel_key == channel_key && c.thread == thread)
    {
      return;
    }
    connections.push(Connection {
      channel_key,
      target,
      thread,
    });
  }

  /// Drops every recorded pair for `channel_key`; idempotent.
  pub(crate) fn async_disconnect(&self, channel_key: usize) {
    self.state.forget_channel(channel_key);
  }

  /// The thread this anchor subscribed to `channel_key` on, if any.
  pub(crate) fn connect_thread(&self, channel_key: usize) -> Option<ThreadKey> {
    self
      .state
      .connections
      .lock()
      .iter()
      .find(|c| c.channel_key == channel_key)
      .map(|c| c.thread)
  }
}

impl Default for Asyncable {
  fn default() -> Self {
    Asyncable::new()
  }
}

impl fmt::Debug for Asyncable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Asyncable")
      .field("connections", &self.state.connections.lock().len())
      .finish()
  }
}

impl Drop for Asyncable {
  fn drop(&mut self) {
    // Take the set first so a re-entrant disconnect sees it empty; never
    // hold the local lock across the call into a channel.
    let connections = mem::take(&mut *self.state.connections.lock());
    let key = self.key();
    for connection in connections {
      if let Some(target) = connection.target.upgrade() {
        target.disconnect_asyncable(key, connection.thread);
      }
    }
  }
}
