//! Agent error types.
//!
//! Telemetry errors never reach the client of the instrumented service. They
//! are logged and counted by the session; only `InvalidArgument` signals a
//! programming error in the caller rather than an agent failure.

use thiserror::Error;

/// Errors raised by [`crate::agent::Agent`] implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Argument rejected before any SDK call was attempted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The agent is not initialized or not supported on this host.
    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    /// A native SDK library or symbol could not be loaded.
    #[error("Failed to load native agent library: {0}")]
    LibraryLoad(String),

    /// The SDK returned an error status code.
    #[error("Agent SDK call {operation} failed with code {code}")]
    Sdk { operation: &'static str, code: i64 },
}

impl AgentError {
    /// True for argument validation failures.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, AgentError::InvalidArgument(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AgentError::InvalidArgument("name is null or whitespace".to_string()).to_string(),
            "Invalid argument: name is null or whitespace"
        );
        assert_eq!(
            AgentError::Sdk {
                operation: "newrelic_transaction_end",
                code: -2
            }
            .to_string(),
            "Agent SDK call newrelic_transaction_end failed with code -2"
        );
    }

    #[test]
    fn test_invalid_argument_detection() {
        assert!(AgentError::InvalidArgument("x".to_string()).is_invalid_argument());
        assert!(!AgentError::Unavailable("x".to_string()).is_invalid_argument());
    }
}
