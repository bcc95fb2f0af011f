//! Argument guards for agent calls.
//!
//! Violations are caller bugs, so they surface as
//! [`AgentError::InvalidArgument`] before any SDK call is made.

use crate::errors::AgentError;

/// Reject empty or whitespace-only strings.
pub fn not_blank(value: &str, argument_name: &str) -> Result<(), AgentError> {
    if value.trim().is_empty() {
        return Err(AgentError::InvalidArgument(format!(
            "{argument_name} is null or whitespace"
        )));
    }
    Ok(())
}

/// Reject zero or negative ids.
pub fn positive_id(value: i64, argument_name: &str) -> Result<i64, AgentError> {
    if value <= 0 {
        return Err(AgentError::InvalidArgument(format!(
            "{argument_name} is an invalid id, should be greater than zero"
        )));
    }
    Ok(value)
}
