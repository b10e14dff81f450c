//! Adaptive waiting for producers facing a full ring.
//!
//! The receiving side of a queue only drains when its thread pumps, so there
//! is nobody to unpark a blocked sender. The strategy is therefore spin,
//! then yield, then sleep in short slices until the condition holds.

use std::thread;
use std::time::Duration;

const SPIN_LIMIT: usize = 32;
const YIELD_LIMIT: usize = 32;
const SLEEP_SLICE: Duration = Duration::from_micros(50);

/// Waits until `cond` returns true.
///
/// Starts with busy spinning, escalates to yielding, and finally sleeps in
/// `SLEEP_SLICE` increments. Returns as soon as the condition is observed.
pub(crate) fn wait_until<F>(cond: F)
where
  F: Fn() -> bool,
{
  for _ in 0..SPIN_LIMIT {
    if cond() {
      return;
    }
    std::hint::spin_loop();
  }

  for _ in 0..YIELD_LIMIT {
    if cond() {
      return;
    }
    thread::yield_now();
  }

  while !cond() {
    thread::sleep(SLEEP_SLICE);
  }
}
