#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! Thread-affine broadcast channels for Rust.
//!
//! `weft` delivers typed values from any number of senders to any number of
//! receivers, with one rule: a receiver callback always runs on the thread
//! it subscribed from, no matter which thread sent. Subscriptions are bound
//! to an [`Asyncable`] lifetime anchor, so dropping a receiver object
//! revokes all of its subscriptions, safely even while sends are in
//! flight on other threads.
//!
//! The library never spawns threads. A thread that wants to receive drives
//! [`process_events`] periodically (its "pump"); threads that only send
//! need not pump. Cross-thread delivery rides bounded single-producer/
//! single-consumer queues, one per (sender thread, receiver thread) pair,
//! with back-pressure instead of loss when a queue fills.
//!
//! On top of the [`Channel`] core sit a few conveniences: [`Notification`]
//! (argument-less signalling), [`invoke::call`] (run a closure on another
//! thread's pump), [`Promise`] (single settlement), and [`NotifyList`]
//! (a sequence broadcasting its changes).

pub mod config;
pub mod error;
pub mod invoke;

mod asyncable;
mod channel;
mod internal;
mod notify;
mod pool;
mod promise;
mod spsc;
mod sync_util;
mod thread_key;

pub use asyncable::Asyncable;
pub use channel::{Channel, ConnectMode, SendMode};
pub use error::PoolExhausted;
pub use notify::{ChangedNotify, Notification, NotifyList};
pub use pool::process_events;
pub use promise::{
  make_promise, make_promise_on, Promise, PromiseMode, Reject, Resolve, Settled,
};
pub use thread_key::ThreadKey;
