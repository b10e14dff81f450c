mod common;
use common::*;

use weft::{make_promise, make_promise_on, PromiseMode, ThreadKey};

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn resolves_through_the_pump() {
  let promise = make_promise::<i32, _>(
    |resolve, _reject| resolve.resolve(40 + 2),
    PromiseMode::AsyncByPromise,
  );

  let got = Arc::new(AtomicI32::new(0));
  let g = got.clone();
  promise.on_resolve(None, move |v| g.store(*v, Ordering::SeqCst));

  // The body has not run yet; AsyncByPromise defers it to the pump.
  assert_eq!(got.load(Ordering::SeqCst), 0);

  assert!(pump_until(|| got.load(Ordering::SeqCst) == 42));
}

#[test]
fn rejects_through_the_pump() {
  let promise = make_promise::<i32, _>(
    |_resolve, reject| reject.reject(7, "out of tune"),
    PromiseMode::AsyncByPromise,
  );

  let got = Arc::new(Mutex::new(None));
  let g = got.clone();
  promise.on_reject(None, move |code, message| {
    *g.lock().unwrap() = Some((code, message.to_string()));
  });

  assert!(pump_until(|| got.lock().unwrap().is_some()));
  assert_eq!(
    *got.lock().unwrap(),
    Some((7, String::from("out of tune")))
  );
}

#[test]
fn async_by_body_can_settle_from_a_worker_thread() {
  let handlers_ready = Arc::new(AtomicBool::new(false));

  let ready = handlers_ready.clone();
  let promise = make_promise::<i32, _>(
    move |resolve, _reject| {
      thread::spawn(move || {
        // Wait until the consumer has attached its handler, then settle
        // from this worker; delivery still happens on the subscribing
        // thread via its pump.
        while !ready.load(Ordering::SeqCst) {
          thread::yield_now();
        }
        resolve.resolve(123)
      });
      weft::Settled::unchecked()
    },
    PromiseMode::AsyncByBody,
  );

  let got = Arc::new(AtomicI32::new(0));
  let g = got.clone();
  promise.on_resolve(None, move |v| g.store(*v, Ordering::SeqCst));
  handlers_ready.store(true, Ordering::SeqCst);

  assert!(pump_until(|| got.load(Ordering::SeqCst) == 123));
}

#[test]
fn body_runs_on_the_requested_thread() {
  let worker_key = Arc::new(Mutex::new(None));
  let go = Arc::new(AtomicBool::new(false));
  let done = Arc::new(AtomicBool::new(false));

  let worker = {
    let worker_key = worker_key.clone();
    let go = go.clone();
    let done = done.clone();
    thread::spawn(move || {
      *worker_key.lock().unwrap() = Some(ThreadKey::current());
      // Hold off pumping until the consumer's handler is attached.
      wait_for(|| go.load(Ordering::SeqCst));
      pump_until(|| done.load(Ordering::SeqCst))
    })
  };

  assert!(wait_for(|| worker_key.lock().unwrap().is_some()));
  let target = worker_key.lock().unwrap().unwrap();

  let body_thread = Arc::new(Mutex::new(None));
  let bt = body_thread.clone();
  let promise = make_promise_on::<i32, _>(
    move |resolve, _reject| {
      *bt.lock().unwrap() = Some(ThreadKey::current());
      resolve.resolve(1)
    },
    target,
  );

  let got = Arc::new(AtomicI32::new(0));
  let g = got.clone();
  let done2 = done.clone();
  promise.on_resolve(None, move |v| {
    g.store(*v, Ordering::SeqCst);
    done2.store(true, Ordering::SeqCst);
  });
  go.store(true, Ordering::SeqCst);

  assert!(pump_until(|| got.load(Ordering::SeqCst) == 1));
  assert!(worker.join().unwrap());
  assert_eq!(*body_thread.lock().unwrap(), Some(target));
}
