#![allow(dead_code)]

use std::time::Duration;

pub const PUMP_LIMIT: usize = 500;
pub const PUMP_INTERVAL: Duration = Duration::from_millis(1);

/// Pumps the calling thread until `done` holds or the attempt limit runs
/// out. Returns whether the condition was reached.
pub fn pump_until<F>(done: F) -> bool
where
  F: Fn() -> bool,
{
  for _ in 0..PUMP_LIMIT {
    weft::process_events();
    if done() {
      return true;
    }
    std::thread::sleep(PUMP_INTERVAL);
  }
  false
}

/// Waits (without pumping) until `cond` holds or the attempt limit runs out.
pub fn wait_for<F>(cond: F) -> bool
where
  F: Fn() -> bool,
{
  for _ in 0..PUMP_LIMIT {
    if cond() {
      return true;
    }
    std::thread::sleep(PUMP_INTERVAL);
  }
  false
}
