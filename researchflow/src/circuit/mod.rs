//! Failure isolation per remote collaborator.
//!
//! This module provides:
//! - `CircuitBreaker`, a three-state machine per collaborator
//! - `BreakerRegistry`, which memoizes one breaker per name
//! - `Clock` implementations so timing can be driven by tests

mod breaker;
mod clock;
mod registry;

pub use breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::BreakerRegistry;
