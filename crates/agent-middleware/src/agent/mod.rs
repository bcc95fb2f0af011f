//! Native APM agent contract.
//!
//! The middleware only talks to the agent through [`Agent`], so the native
//! SDK binding can be swapped for the recording [`MockAgent`] in tests.

pub mod guard;
pub mod mock;
pub mod native;

pub use mock::{AgentCall, MockAgent};
pub use native::NativeAgent;

use crate::errors::AgentError;
use common::secret::SecretString;
use std::fmt;

/// Handle of an open agent transaction.
///
/// Only valid between `begin_transaction` and `end_transaction`. Always
/// positive: construction goes through [`TransactionId::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(i64);

impl TransactionId {
    /// # Errors
    ///
    /// `InvalidArgument` if `raw` is zero or negative.
    pub fn new(raw: i64) -> Result<Self, AgentError> {
        guard::positive_id(raw, "transaction_id").map(Self)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operations exposed by the native agent.
///
/// Implementations validate their arguments before reaching the SDK and
/// report SDK failures as errors; they must not panic.
pub trait Agent: Send + Sync {
    /// One-time process initialization.
    fn init(
        &self,
        license_key: &SecretString,
        app_name: &str,
        language: &str,
        language_version: &str,
    ) -> Result<(), AgentError>;

    fn begin_transaction(&self) -> Result<TransactionId, AgentError>;

    fn set_transaction_name(
        &self,
        transaction_id: TransactionId,
        name: &str,
    ) -> Result<(), AgentError>;

    fn notice_error(
        &self,
        transaction_id: TransactionId,
        error_type: &str,
        error_message: &str,
        stack_trace: &str,
    ) -> Result<(), AgentError>;

    fn end_transaction(&self, transaction_id: TransactionId) -> Result<(), AgentError>;

    /// Record a custom metric. Not used on the per-request path.
    fn record_metric(&self, name: &str, value: f64) -> Result<(), AgentError>;

    /// Ask the agent to flush and stop.
    fn shutdown(&self, reason: &str) -> Result<(), AgentError>;
}
