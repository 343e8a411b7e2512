//! Cooperative cancellation.
//!
//! A single [`CancellationToken`] threads through an entire run: the
//! orchestrator checks it between stages and every retrying invocation races
//! its in-flight attempt and backoff sleeps against it.

mod token;

pub use token::{cancelled_or_pending, CancellationToken};
