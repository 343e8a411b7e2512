//! Calling remote collaborators.
//!
//! - [`AgentInvoker`] is the capability for the generative service
//! - [`RetryingInvoker`] wraps one call with timeout, retry and breaker checks
//! - [`StageInvoker`] is the per-run gateway stages use

mod agent;
mod gateway;
mod invoker;
mod policy;

#[cfg(test)]
pub use agent::MockAgentInvoker;
pub use agent::{AgentInvoker, AgentRequest, AgentResponse, Usage};
pub use gateway::StageInvoker;
pub use invoker::{InvocationStats, RetryingInvoker};
pub use policy::{JitterStrategy, RetryPolicy};
