// src/promise.rs

//! Single-settlement result delivery on top of channels.
//!
//! A [`Promise`] runs a body that is handed two single-use capabilities,
//! [`Resolve`] and [`Reject`]. Each is consumed by calling it, and only
//! they can mint the [`Settled`] token the body must return, so settling
//! twice is unrepresentable. Consumers attach [`Promise::on_resolve`] /
//! [`Promise::on_reject`] handlers, which follow the usual subscription
//! rules (owner lifetime binding, delivery on the subscribing thread).
//!
//! # Examples
//!
//! ```
//! use weft::{make_promise, process_events, PromiseMode};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//!
//! let promise = make_promise::<i32, _>(
//!     |resolve, _reject| resolve.resolve(41 + 1),
//!     PromiseMode::AsyncByPromise,
//! );
//!
//! let got = Arc::new(AtomicI32::new(0));
//! let g = got.clone();
//! promise.on_resolve(None, move |v| g.store(*v, Ordering::Relaxed));
//!
//! // AsyncByPromise defers the body to the next pump, so the handler
//! // above is attached in time.
//! process_events();
//! assert_eq!(got.load(Ordering::Relaxed), 42);
//! ```

use crate::asyncable::Asyncable;
use crate::channel::core::{Callback, ChannelCore, ConnectMode, SendMode};
use crate::invoke;
use crate::thread_key::ThreadKey;

use std::fmt;
use std::sync::Arc;

/// When the promise body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromiseMode {
  /// The body is scheduled onto the pump (of the current thread, or of the
  /// thread given to [`make_promise_on`]), so handlers attached right
  /// after construction see the settlement.
  #[default]
  AsyncByPromise,
  /// The body runs inline inside `make_promise`; it is expected to settle
  /// later (e.g. from a worker thread it spawns).
  AsyncByBody,
}

struct PromiseData<T: Clone + Send + 'static> {
  resolve: Arc<ChannelCore<T>>,
  reject: Arc<ChannelCore<(i32, String)>>,
}

/// Proof that a promise body settled. Only [`Resolve`] and [`Reject`] can
/// construct it.
#[must_use]
pub struct Settled(());

impl Settled {
  /// Escape hatch for bodies that move their capability somewhere else
  /// (typically into a worker thread) and settle after returning. The
  /// exactly-once discipline then rests on the moved capability alone.
  pub fn unchecked() -> Settled {
    Settled(())
  }
}

impl fmt::Debug for Settled {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Settled")
  }
}

/// Single-use capability to resolve a promise.
pub struct Resolve<T: Clone + Send + 'static> {
  data: Arc<PromiseData<T>>,
}

impl<T: Clone + Send + 'static> Resolve<T> {
  /// Settles the promise with a value, consuming the capability.
  pub fn resolve(self, value: T) -> Settled {
    self.data.resolve.send(SendMode::Auto, value);
    Settled(())
  }
}

impl<T: Clone + Send + 'static> fmt::Debug for Resolve<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Resolve")
  }
}

/// Single-use capability to reject a promise.
pub struct Reject<T: Clone + Send + 'static> {
  data: Arc<PromiseData<T>>,
}

impl<T: Clone + Send + 'static> Reject<T> {
  /// Settles the promise with an error code and message, consuming the
  /// capability.
  pub fn reject(self, code: i32, message: impl Into<String>) -> Settled {
    self
      .data
      .reject
      .send(SendMode::Auto, (code, message.into()));
    Settled(())
  }
}

impl<T: Clone + Send + 'static> fmt::Debug for Reject<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Reject")
  }
}

/// Handle to a promised result. Cloning shares the settlement channels.
pub struct Promise<T: Clone + Send + 'static> {
  data: Arc<PromiseData<T>>,
}

impl<T: Clone + Send + 'static> Promise<T> {
  /// Attaches a resolve handler on the current thread.
  pub fn on_resolve<F>(&self, owner: Option<&Asyncable>, callback: F) -> &Self
  where
    F: Fn(&T) + Send + 'static,
  {
    let callback: Callback<T> = Box::new(callback);
    self
      .data
      .resolve
      .on_receive(owner, callback, ConnectMode::SetOnce);
    self
  }

  /// Attaches a reject handler on the current thread.
  pub fn on_reject<F>(&self, owner: Option<&Asyncable>, callback: F) -> &Self
  where
    F: Fn(i32, &str) + Send + 'static,
  {
    let callback: Callback<(i32, String)> =
      Box::new(move |(code, message)| callback(*code, message));
    self
      .data
      .reject
      .on_receive(owner, callback, ConnectMode::SetOnce);
    self
  }
}

impl<T: Clone + Send + 'static> Clone for Promise<T> {
  fn clone(&self) -> Self {
    Promise {
      data: self.data.clone(),
    }
  }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Promise")
      .field("resolved_listeners", &self.data.resolve.is_connected())
      .field("rejected_listeners", &self.data.reject.is_connected())
      .finish()
  }
}

/// Creates a promise whose body runs per `mode`.
///
/// The body receives the two settlement capabilities and must return the
/// [`Settled`] token obtained by consuming exactly one of them.
pub fn make_promise<T, B>(body: B, mode: PromiseMode) -> Promise<T>
where
  T: Clone + Send + 'static,
  B: FnOnce(Resolve<T>, Reject<T>) -> Settled + Send + 'static,
{
  let promise = new_promise();
  let resolve = Resolve {
    data: promise.data.clone(),
  };
  let reject = Reject {
    data: promise.data.clone(),
  };
  match mode {
    PromiseMode::AsyncByBody => {
      let _ = body(resolve, reject);
    }
    PromiseMode::AsyncByPromise => {
      invoke::call(None, move || {
        let _ = body(resolve, reject);
      });
    }
  }
  promise
}

/// Creates a promise whose body runs on `target`'s next pump.
pub fn make_promise_on<T, B>(body: B, target: ThreadKey) -> Promise<T>
where
  T: Clone + Send + 'static,
  B: FnOnce(Resolve<T>, Reject<T>) -> Settled + Send + 'static,
{
  let promise = new_promise();
  let resolve = Resolve {
    data: promise.data.clone(),
  };
  let reject = Reject {
    data: promise.data.clone(),
  };
  invoke::call_on(target, None, move || {
    let _ = body(resolve, reject);
  });
  promise
}

fn new_promise<T: Clone + Send + 'static>() -> Promise<T> {
  Promise {
    data: Arc::new(PromiseData {
      resolve: ChannelCore::new(),
      reject: ChannelCore::new(),
    }),
  }
}
