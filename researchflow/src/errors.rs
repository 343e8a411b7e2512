//! Error types for the researchflow engine.
//!
//! The taxonomy separates failures that are worth retrying (transient remote
//! failures and timeouts) from failures that must propagate immediately
//! (open circuits, exhausted budgets, cancellation, validation).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = ResearchflowError> = std::result::Result<T, E>;

/// The main error type for researchflow operations.
#[derive(Debug, Error)]
pub enum ResearchflowError {
    /// A remote collaborator failed in a way that may succeed on retry.
    #[error("Transient failure in '{collaborator}': {message}")]
    Transient {
        /// The collaborator that failed.
        collaborator: String,
        /// Failure detail from the remote side.
        message: String,
    },

    /// A single attempt exceeded its timeout.
    #[error("Call to '{collaborator}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The collaborator that timed out.
        collaborator: String,
        /// The per-attempt timeout that elapsed.
        timeout_ms: u64,
    },

    /// The collaborator's circuit breaker rejected the call.
    #[error("Circuit open for '{collaborator}'")]
    CircuitOpen {
        /// The collaborator whose breaker is open.
        collaborator: String,
    },

    /// Accumulated usage is above the configured ceiling.
    #[error("Budget exceeded: {spent} units used, ceiling is {ceiling}")]
    BudgetExceeded {
        /// Units spent so far.
        spent: u64,
        /// The configured ceiling.
        ceiling: u64,
    },

    /// Input or generated data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation was cancelled through a cancellation token.
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error raised by stage logic.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResearchflowError {
    /// Creates a transient remote failure.
    #[must_use]
    pub fn transient(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(collaborator: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            collaborator: collaborator.into(),
            timeout_ms,
        }
    }

    /// Creates a circuit-open failure.
    #[must_use]
    pub fn circuit_open(collaborator: impl Into<String>) -> Self {
        Self::CircuitOpen {
            collaborator: collaborator.into(),
        }
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Creates a validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true if a retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Returns a stable label for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Timeout { .. } => "timeout",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Validation(_) => "validation",
            Self::Cancelled { .. } => "cancelled",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// Converts to a diagnostic record.
    #[must_use]
    pub fn to_info(&self) -> ErrorInfo {
        let mut info = ErrorInfo::new(self.kind(), self.to_string());
        match self {
            Self::Transient { collaborator, .. }
            | Self::Timeout { collaborator, .. }
            | Self::CircuitOpen { collaborator } => {
                info = info.with_context_entry("collaborator", collaborator.clone());
            }
            Self::BudgetExceeded { spent, ceiling } => {
                info = info
                    .with_context_entry("spent", spent.to_string())
                    .with_context_entry("ceiling", ceiling.to_string());
            }
            _ => {}
        }
        info.retryable = self.is_retryable();
        info
    }
}

/// Serializable description of an error, attached to events and warnings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error kind label (see [`ResearchflowError::kind`]).
    pub kind: String,
    /// Human readable message.
    pub message: String,
    /// Whether the failure was retryable.
    pub retryable: bool,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            retryable: false,
            context: HashMap::new(),
        }
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ResearchflowError::transient("search", "503").is_retryable());
        assert!(ResearchflowError::timeout("search", 100).is_retryable());
        assert!(!ResearchflowError::circuit_open("search").is_retryable());
        assert!(!ResearchflowError::BudgetExceeded { spent: 10, ceiling: 5 }.is_retryable());
        assert!(!ResearchflowError::cancelled("user").is_retryable());
        assert!(!ResearchflowError::validation("bad json").is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = ResearchflowError::timeout("critic", 2500);
        assert_eq!(err.to_string(), "Call to 'critic' timed out after 2500ms");

        let err = ResearchflowError::BudgetExceeded { spent: 120, ceiling: 100 };
        assert_eq!(err.to_string(), "Budget exceeded: 120 units used, ceiling is 100");
    }

    #[test]
    fn test_to_info_carries_context() {
        let info = ResearchflowError::transient("ideator", "connection reset").to_info();
        assert_eq!(info.kind, "transient");
        assert!(info.retryable);
        assert_eq!(info.context.get("collaborator"), Some(&"ideator".to_string()));

        let info = ResearchflowError::BudgetExceeded { spent: 7, ceiling: 5 }.to_info();
        assert_eq!(info.context.get("spent"), Some(&"7".to_string()));
        assert!(!info.retryable);
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: ResearchflowError = anyhow::anyhow!("stage blew up").into();
        assert_eq!(err.kind(), "other");
        assert_eq!(err.to_string(), "stage blew up");
    }
}
