// src/invoke.rs

//! One-shot cross-thread calls.
//!
//! [`call`] and [`call_on`] schedule a closure to run on a target thread
//! during that thread's next pump. The call is bound to an optional
//! [`Asyncable`] owner: if the owner drops before the pump, the closure is
//! skipped, under the same lifetime rule that governs channel subscriptions.
//!
//! A process-wide invoker keeps one SPSC queue per (sender thread, target
//! thread) edge, registered with the queue pool like any channel queue.

use crate::asyncable::{AsyncKey, Asyncable, Disconnectable};
use crate::config::QUEUE_CAPACITY;
use crate::error::PoolExhausted;
use crate::pool::QueuePool;
use crate::spsc::{self, SendPort};
use crate::thread_key::ThreadKey;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// Schedules `f` to run on the current thread's next pump.
pub fn call<F>(owner: Option<&Asyncable>, f: F)
where
  F: FnOnce() + Send + 'static,
{
  call_on(ThreadKey::current(), owner, f);
}

/// Schedules `f` to run on `target`'s next pump.
///
/// If `owner` is given and drops before `target` pumps, `f` never runs.
pub fn call_on<F>(target: ThreadKey, owner: Option<&Asyncable>, f: F)
where
  F: FnOnce() + Send + 'static,
{
  let from = ThreadKey::current();
  let edge = match INVOKER.edge(from, target) {
    Ok(edge) => edge,
    Err(err) => {
      error!(%err, "queue pool exhausted");
      panic!("{err}");
    }
  };

  let caller = owner.map(|owner| {
    let key = owner.key();
    edge.callers.lock().insert(key);
    let edge_dyn: Arc<dyn Disconnectable> = edge.clone();
    let target_cap: Weak<dyn Disconnectable> = Arc::downgrade(&edge_dyn);
    owner.async_connect(edge_key(&edge), target_cap, target);
    key
  });

  edge.send.send(CallTask {
    caller,
    func: Box::new(f),
  });
}

struct CallTask {
  caller: Option<AsyncKey>,
  func: Box<dyn FnOnce() + Send>,
}

struct EdgeQueue {
  send_thread: ThreadKey,
  target_thread: ThreadKey,
  send: Arc<SendPort<CallTask>>,
  callers: Mutex<HashSet<AsyncKey>>,
}

impl Disconnectable for EdgeQueue {
  fn disconnect_asyncable(&self, owner: AsyncKey, _connect_thread: ThreadKey) {
    self.callers.lock().remove(&owner);
  }
}

fn edge_key(edge: &Arc<EdgeQueue>) -> usize {
  Arc::as_ptr(edge) as usize
}

struct Invoker {
  edges: Mutex<Vec<Arc<EdgeQueue>>>,
}

static INVOKER: Lazy<Invoker> = Lazy::new(|| Invoker {
  edges: Mutex::new(Vec::new()),
});

impl Invoker {
  fn edge(&self, from: ThreadKey, to: ThreadKey) -> Result<Arc<EdgeQueue>, PoolExhausted> {
    let mut edges = self.edges.lock();
    if let Some(edge) = edges
      .iter()
      .find(|e| e.send_thread == from && e.target_thread == to)
    {
      return Ok(edge.clone());
    }

    let (send, recv) = spsc::queue(QUEUE_CAPACITY);
    let edge = Arc::new(EdgeQueue {
      send_thread: from,
      target_thread: to,
      send,
      callers: Mutex::new(HashSet::new()),
    });

    // The handler holds the edge weakly; the strong reference lives in the
    // invoker's edge list.
    let weak = Arc::downgrade(&edge);
    recv.on_message(move |task: CallTask| {
      let Some(edge) = weak.upgrade() else { return };
      let run = match task.caller {
        Some(key) => edge.callers.lock().contains(&key),
        None => true,
      };
      if run {
        (task.func)();
      }
    });

    let pool = QueuePool::instance();
    pool.register(from, edge.send.clone())?;
    pool.register(to, recv)?;
    debug!(from = %from, to = %to, "created invoke edge");

    edges.push(edge.clone());
    Ok(edge)
  }
}
