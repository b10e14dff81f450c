mod common;
use common::*;

use weft::{invoke, Asyncable, ThreadKey};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn runs_on_the_next_pump_not_inline() {
  let anchor = Asyncable::new();
  let calls = Arc::new(AtomicUsize::new(0));

  let c = calls.clone();
  invoke::call(Some(&anchor), move || {
    c.fetch_add(1, Ordering::SeqCst);
  });
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  weft::process_events();
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  // Nothing left queued.
  weft::process_events();
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn skipped_when_the_owner_drops_before_the_pump() {
  let calls = Arc::new(AtomicUsize::new(0));

  {
    let anchor = Asyncable::new();
    let c = calls.clone();
    invoke::call(Some(&anchor), move || {
      c.fetch_add(1, Ordering::SeqCst);
    });
  }

  weft::process_events();
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn anonymous_calls_always_run() {
  let calls = Arc::new(AtomicUsize::new(0));
  let c = calls.clone();
  invoke::call(None, move || {
    c.fetch_add(1, Ordering::SeqCst);
  });

  weft::process_events();
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn runs_on_the_target_thread() {
  let worker_key = Arc::new(Mutex::new(None));
  let done = Arc::new(AtomicBool::new(false));
  let ran_on = Arc::new(Mutex::new(None));

  let worker = {
    let worker_key = worker_key.clone();
    let done = done.clone();
    thread::spawn(move || {
      *worker_key.lock().unwrap() = Some(ThreadKey::current());
      pump_until(|| done.load(Ordering::SeqCst))
    })
  };

  assert!(wait_for(|| worker_key.lock().unwrap().is_some()));
  let target = worker_key.lock().unwrap().unwrap();

  let anchor = Asyncable::new();
  let ran_on2 = ran_on.clone();
  let done2 = done.clone();
  invoke::call_on(target, Some(&anchor), move || {
    *ran_on2.lock().unwrap() = Some(ThreadKey::current());
    done2.store(true, Ordering::SeqCst);
  });

  assert!(worker.join().unwrap());
  assert_eq!(*ran_on.lock().unwrap(), Some(target));
}

#[test]
fn cross_thread_call_is_skipped_once_the_owner_is_gone() {
  let worker_key = Arc::new(Mutex::new(None));
  let go = Arc::new(AtomicBool::new(false));
  let stop = Arc::new(AtomicBool::new(false));
  let calls = Arc::new(AtomicUsize::new(0));

  let worker = {
    let worker_key = worker_key.clone();
    let go = go.clone();
    let stop = stop.clone();
    thread::spawn(move || {
      *worker_key.lock().unwrap() = Some(ThreadKey::current());
      // Hold off pumping until the owner is dropped.
      wait_for(|| go.load(Ordering::SeqCst));
      pump_until(|| stop.load(Ordering::SeqCst));
    })
  };

  assert!(wait_for(|| worker_key.lock().unwrap().is_some()));
  let target = worker_key.lock().unwrap().unwrap();

  {
    let anchor = Asyncable::new();
    let c = calls.clone();
    invoke::call_on(target, Some(&anchor), move || {
      c.fetch_add(1, Ordering::SeqCst);
    });
    // The anchor drops before the worker is allowed to pump the call.
  }

  go.store(true, Ordering::SeqCst);
  thread::sleep(PUMP_INTERVAL * 20);
  stop.store(true, Ordering::SeqCst);
  worker.join().unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 0);
}
