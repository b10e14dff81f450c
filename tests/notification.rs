use weft::{Asyncable, Notification};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn notify_reaches_every_subscriber() {
  let n = Notification::new();
  let first = Arc::new(AtomicUsize::new(0));
  let second = Arc::new(AtomicUsize::new(0));

  let f = first.clone();
  n.on_notify(None, move || {
    f.fetch_add(1, Ordering::SeqCst);
  });
  let s = second.clone();
  n.on_notify(None, move || {
    s.fetch_add(1, Ordering::SeqCst);
  });

  n.notify();
  n.notify();

  assert_eq!(first.load(Ordering::SeqCst), 2);
  assert_eq!(second.load(Ordering::SeqCst), 2);
}

#[test]
fn is_connected_tracks_listeners() {
  let n = Notification::new();
  assert!(!n.is_connected());

  let anchor = Asyncable::new();
  n.on_notify(Some(&anchor), || {});
  assert!(n.is_connected());

  n.reset_on_notify(&anchor);
  assert!(!n.is_connected());
}

#[test]
fn reset_on_notify_stops_delivery() {
  let n = Notification::new();
  let anchor = Asyncable::new();
  let calls = Arc::new(AtomicUsize::new(0));

  let c = calls.clone();
  n.on_notify(Some(&anchor), move || {
    c.fetch_add(1, Ordering::SeqCst);
  });

  n.notify();
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  n.reset_on_notify(&anchor);
  n.notify();
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  // A second reset is a no-op.
  n.reset_on_notify(&anchor);
}

#[test]
fn owner_drop_revokes_the_subscription() {
  let n = Notification::new();
  let calls = Arc::new(AtomicUsize::new(0));

  {
    let anchor = Asyncable::new();
    let c = calls.clone();
    n.on_notify(Some(&anchor), move || {
      c.fetch_add(1, Ordering::SeqCst);
    });

    n.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  assert!(!n.is_connected());
  n.notify();
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn close_reaches_close_subscribers_only() {
  let n = Notification::new();
  let notified = Arc::new(AtomicUsize::new(0));
  let closed = Arc::new(AtomicUsize::new(0));

  let nn = notified.clone();
  n.on_notify(None, move || {
    nn.fetch_add(1, Ordering::SeqCst);
  });
  let c = closed.clone();
  n.on_close(None, move || {
    c.fetch_add(1, Ordering::SeqCst);
  });

  n.close();
  assert_eq!(closed.load(Ordering::SeqCst), 1);
  assert_eq!(notified.load(Ordering::SeqCst), 0);
}

#[test]
fn clones_share_the_same_endpoint() {
  let n = Notification::new();
  let copy = n.clone();
  let calls = Arc::new(AtomicUsize::new(0));

  let c = calls.clone();
  copy.on_notify(None, move || {
    c.fetch_add(1, Ordering::SeqCst);
  });

  n.notify();
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert!(n.is_connected());
}
