//! Recording agent for tests.
//!
//! `MockAgent` keeps every call it receives, in order, and can be told to
//! fail individual operations. Arguments go through the same guards as the
//! native binding, after the call is recorded.

use super::{guard, Agent, TransactionId};
use crate::errors::AgentError;
use common::secret::{ExposeSecret, SecretString};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// One recorded agent call.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCall {
    Init {
        app_name: String,
        language: String,
        language_version: String,
    },
    BeginTransaction,
    SetTransactionName {
        transaction_id: TransactionId,
        name: String,
    },
    NoticeError {
        transaction_id: TransactionId,
        error_type: String,
        error_message: String,
        stack_trace: String,
    },
    EndTransaction {
        transaction_id: TransactionId,
    },
    RecordMetric {
        name: String,
        value: f64,
    },
    Shutdown {
        reason: String,
    },
}

impl AgentCall {
    /// Operation name, matching the metric label used for failures.
    pub fn operation(&self) -> &'static str {
        match self {
            AgentCall::Init { .. } => "init",
            AgentCall::BeginTransaction => "begin_transaction",
            AgentCall::SetTransactionName { .. } => "set_transaction_name",
            AgentCall::NoticeError { .. } => "notice_error",
            AgentCall::EndTransaction { .. } => "end_transaction",
            AgentCall::RecordMetric { .. } => "record_metric",
            AgentCall::Shutdown { .. } => "shutdown",
        }
    }
}

/// Mock agent for unit and integration testing.
#[derive(Default)]
pub struct MockAgent {
    calls: Mutex<Vec<AgentCall>>,
    last_transaction_id: AtomicI64,
    fail_init: AtomicBool,
    fail_begin: AtomicBool,
    fail_set_name: AtomicBool,
    fail_notice_error: AtomicBool,
    fail_end: AtomicBool,
}

impl MockAgent {
    /// Agent on which every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent whose `init` fails.
    pub fn failing_init() -> Self {
        let agent = Self::new();
        agent.fail_init.store(true, Ordering::SeqCst);
        agent
    }

    /// Agent whose `begin_transaction` fails.
    pub fn failing_begin() -> Self {
        let agent = Self::new();
        agent.fail_begin.store(true, Ordering::SeqCst);
        agent
    }

    /// Agent whose `end_transaction` fails.
    pub fn failing_end() -> Self {
        let agent = Self::new();
        agent.fail_end.store(true, Ordering::SeqCst);
        agent
    }

    /// Agent whose `set_transaction_name` and `notice_error` fail.
    pub fn failing_reports() -> Self {
        let agent = Self::new();
        agent.fail_set_name.store(true, Ordering::SeqCst);
        agent.fail_notice_error.store(true, Ordering::SeqCst);
        agent
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().clone()
    }

    /// Operation names of all calls received so far, in order.
    pub fn operations(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(AgentCall::operation).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: AgentCall) {
        self.calls.lock().push(call);
    }

    fn result(flag: &AtomicBool, operation: &'static str) -> Result<(), AgentError> {
        if flag.load(Ordering::SeqCst) {
            return Err(AgentError::Sdk { operation, code: -1 });
        }
        Ok(())
    }
}

impl Agent for MockAgent {
    fn init(
        &self,
        license_key: &SecretString,
        app_name: &str,
        language: &str,
        language_version: &str,
    ) -> Result<(), AgentError> {
        self.record(AgentCall::Init {
            app_name: app_name.to_string(),
            language: language.to_string(),
            language_version: language_version.to_string(),
        });
        guard::not_blank(license_key.expose_secret(), "license_key")?;
        guard::not_blank(app_name, "app_name")?;
        guard::not_blank(language, "language")?;
        guard::not_blank(language_version, "language_version")?;
        Self::result(&self.fail_init, "newrelic_init")
    }

    fn begin_transaction(&self) -> Result<TransactionId, AgentError> {
        self.record(AgentCall::BeginTransaction);
        Self::result(&self.fail_begin, "newrelic_transaction_begin")?;
        let raw = self.last_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        TransactionId::new(raw)
    }

    fn set_transaction_name(
        &self,
        transaction_id: TransactionId,
        name: &str,
    ) -> Result<(), AgentError> {
        self.record(AgentCall::SetTransactionName {
            transaction_id,
            name: name.to_string(),
        });
        guard::not_blank(name, "name")?;
        Self::result(&self.fail_set_name, "newrelic_transaction_set_name")
    }

    fn notice_error(
        &self,
        transaction_id: TransactionId,
        error_type: &str,
        error_message: &str,
        stack_trace: &str,
    ) -> Result<(), AgentError> {
        self.record(AgentCall::NoticeError {
            transaction_id,
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
            stack_trace: stack_trace.to_string(),
        });
        guard::not_blank(error_type, "error_type")?;
        guard::not_blank(error_message, "error_message")?;
        Self::result(&self.fail_notice_error, "newrelic_transaction_notice_error")
    }

    fn end_transaction(&self, transaction_id: TransactionId) -> Result<(), AgentError> {
        self.record(AgentCall::EndTransaction { transaction_id });
        Self::result(&self.fail_end, "newrelic_transaction_end")
    }

    fn record_metric(&self, name: &str, value: f64) -> Result<(), AgentError> {
        self.record(AgentCall::RecordMetric {
            name: name.to_string(),
            value,
        });
        guard::not_blank(name, "name")
    }

    fn shutdown(&self, reason: &str) -> Result<(), AgentError> {
        self.record(AgentCall::Shutdown {
            reason: reason.to_string(),
        });
        Ok(())
    }
}
