// src/channel/mod.rs

//! Typed, multi-receiver broadcast endpoints.
//!
//! A [`Channel`] delivers values from any number of senders to any number
//! of receivers, and every receiver callback runs on the thread it
//! subscribed from, regardless of which thread sent. Same-thread
//! receivers are invoked in line; cross-thread receivers observe the value
//! when their thread next calls [`process_events`](crate::process_events).
//!
//! Multi-argument channels use a tuple value type (`Channel<(i32, i32)>`);
//! argument-less signalling uses `Channel<()>` or the
//! [`Notification`](crate::Notification) facade.
//!
//! # Examples
//!
//! ```
//! use weft::Channel;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//!
//! let ch = Channel::<i32>::new();
//! let received = Arc::new(AtomicI32::new(0));
//!
//! let r = received.clone();
//! ch.on_receive(None, move |v| r.store(*v, Ordering::Relaxed));
//!
//! ch.send(42);
//! assert_eq!(received.load(Ordering::Relaxed), 42);
//! ```
//!
//! Cross-thread delivery requires the receiving thread to pump:
//!
//! ```no_run
//! use weft::{process_events, Channel};
//! use std::thread;
//! use std::time::Duration;
//!
//! let ch = Channel::<i32>::new();
//! let worker = {
//!     let ch = ch.clone();
//!     thread::spawn(move || {
//!         ch.on_receive(None, |v| println!("got {v}"));
//!         for _ in 0..100 {
//!             process_events();
//!             thread::sleep(Duration::from_millis(1));
//!         }
//!     })
//! };
//!
//! thread::sleep(Duration::from_millis(50));
//! ch.send(7); // runs the worker's callback on the worker thread
//! worker.join().unwrap();
//! ```

pub(crate) mod core;

use self::core::{Callback, ChannelCore};
use crate::asyncable::Asyncable;
use std::fmt;
use std::sync::Arc;

pub use self::core::{ConnectMode, SendMode};

/// A shareable broadcast endpoint carrying values of type `T`.
///
/// Cloning is cheap and thread-safe; every clone refers to the same
/// underlying state ([`key`](Channel::key) exposes that identity).
pub struct Channel<T: Clone + Send + 'static> {
  core: Arc<ChannelCore<T>>,
}

impl<T: Clone + Send + 'static> Channel<T> {
  /// Creates a channel with no receivers.
  pub fn new() -> Self {
    Channel {
      core: ChannelCore::new(),
    }
  }

  /// Sends `value` in [`SendMode::Auto`]: same-thread receivers run before
  /// this returns, other threads observe the value on their next pump.
  ///
  /// A send with no receivers is a no-op and allocates nothing.
  pub fn send(&self, value: T) {
    self.core.send(SendMode::Auto, value);
  }

  /// Sends `value` with an explicit routing mode. [`SendMode::Queue`]
  /// defers even same-thread receivers to the next pump, giving a loopback
  /// through the event queue.
  pub fn send_mode(&self, mode: SendMode, value: T) {
    self.core.send(mode, value);
  }

  /// Subscribes `callback` on the current thread in [`ConnectMode::SetOnce`].
  ///
  /// With `owner = None` the subscription is anonymous: it has no lifetime
  /// binding and persists until the channel is dropped. With an owner, the
  /// subscription is revoked automatically when the owner drops.
  pub fn on_receive<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn(&T) + Send + 'static,
  {
    self.on_receive_mode(owner, callback, ConnectMode::SetOnce);
  }

  /// Subscribes `callback` on the current thread with an explicit
  /// replacement mode.
  pub fn on_receive_mode<F>(&self, owner: Option<&Asyncable>, callback: F, mode: ConnectMode)
  where
    F: Fn(&T) + Send + 'static,
  {
    let callback: Callback<T> = Box::new(callback);
    self.core.on_receive(owner, callback, mode);
  }

  /// Removes `owner`'s subscription; idempotent.
  ///
  /// Called on the connect thread, the receiver stops firing before this
  /// returns. Called from another thread, the removal is routed to the
  /// connect thread and ordered after values already sent from here.
  pub fn disconnect(&self, owner: &Asyncable) {
    self.core.disconnect(owner);
  }

  /// True while at least one receiver is subscribed and enabled.
  pub fn is_connected(&self) -> bool {
    self.core.is_connected()
  }

  /// Signals the close sub-channel.
  pub fn close(&self) {
    self.core.close_core().send(SendMode::Auto, ());
  }

  /// Subscribes to the close sub-channel.
  pub fn on_close<F>(&self, owner: Option<&Asyncable>, callback: F)
  where
    F: Fn() + Send + 'static,
  {
    let callback: Callback<()> = Box::new(move |_| callback());
    self
      .core
      .close_core()
      .on_receive(owner, callback, ConnectMode::SetOnce);
  }

  /// Identity of the underlying shared state; equal across clones.
  pub fn key(&self) -> usize {
    self.core.key()
  }
}

impl<T: Clone + Send + 'static> Clone for Channel<T> {
  fn clone(&self) -> Self {
    Channel {
      core: self.core.clone(),
    }
  }
}

impl<T: Clone + Send + 'static> Default for Channel<T> {
  fn default() -> Self {
    Channel::new()
  }
}

impl<T: Clone + Send + 'static> PartialEq for Channel<T> {
  fn eq(&self, other: &Self) -> bool {
    self.key() == other.key()
  }
}

impl<T: Clone + Send + 'static> Eq for Channel<T> {}

impl<T: Clone + Send + 'static> fmt::Debug for Channel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel")
      .field("key", &self.key())
      .field("connected", &self.is_connected())
      .finish()
  }
}
