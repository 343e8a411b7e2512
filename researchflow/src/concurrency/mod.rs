//! Bounded-concurrency execution of item batches.
//!
//! Futures are polled cooperatively on the calling task, so the executor
//! never introduces thread parallelism; it only interleaves I/O waits.

mod bounded;

pub use bounded::BoundedConcurrencyExecutor;
