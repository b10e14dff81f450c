//! Build-time capacity limits.
//!
//! These are fixed at compile time and are not user-facing knobs. Exceeding
//! a thread limit is a programming error, not a runtime condition.

/// Capacity of every cross-thread message queue. When a queue holds this
/// many unprocessed messages the sender waits for the receiving thread to
/// pump; nothing is ever dropped.
pub const QUEUE_CAPACITY: usize = 256;

/// Maximum number of distinct connect threads a single channel can span.
pub const MAX_THREADS_PER_CHANNEL: usize = 32;

/// Total number of threads in the process that can interact through this
/// library (i.e. that register ports with the queue pool).
pub const MAX_THREADS: usize = 32;
