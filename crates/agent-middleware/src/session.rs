//! Per-request instrumentation.
//!
//! An [`InstrumentationSession`] drives the agent through one request:
//!
//! ```text
//! Idle --begin ok--> Began --complete--> Completed --> Ended
//!   |                  \----fail------> Failed -----> Ended
//!   \--begin failed------------------------------------^
//! ```
//!
//! A session whose `begin` failed is inert: no further agent calls are made
//! and the caller runs the handler uninstrumented. Every agent error after
//! that point is logged and counted, never returned, so telemetry cannot
//! change what the client sees.

use crate::agent::{Agent, TransactionId};
use crate::errors::AgentError;
use crate::models::RouteValues;
use crate::observability::metrics::{
    record_agent_call_failure, record_transaction, record_transaction_skipped, Outcome,
};
use axum::http::StatusCode;
use std::any::Any;
use std::time::Instant;
use tracing::{debug, error, warn};
use txn_labeller::LabelResolver;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Began,
    Completed,
    Failed,
    Ended,
}

/// The open transaction of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    transaction_id: TransactionId,
    label: Option<String>,
}

impl TransactionContext {
    fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            label: None,
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Name given to the transaction, once set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// A handler failure as reported to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    error_type: String,
    message: String,
    stack_trace: String,
}

impl HandlerFailure {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }

    /// Describe an error returned by a handler.
    ///
    /// The type is the Rust type name, the message its `Display` output and
    /// the trace its `source()` chain, one cause per line.
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let error_type = std::any::type_name::<E>().to_string();

        let mut message = error.to_string();
        if message.trim().is_empty() {
            message.clone_from(&error_type);
        }

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            error_type,
            message,
            stack_trace: causes.join("\n"),
        }
    }

    /// Describe a handler panic from its payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "handler panicked".to_string());

        Self {
            error_type: "panic".to_string(),
            message,
            stack_trace: String::new(),
        }
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack_trace(&self) -> &str {
        &self.stack_trace
    }
}

/// Instrumentation of a single request.
///
/// Owned by the request's task; sessions share nothing but the agent and the
/// resolver. Dropping a session with an open transaction (the request future
/// was cancelled) ends that transaction.
pub struct InstrumentationSession<'a> {
    agent: &'a dyn Agent,
    resolver: &'a LabelResolver,
    state: SessionState,
    context: Option<TransactionContext>,
    started: Option<Instant>,
}

impl<'a> InstrumentationSession<'a> {
    pub fn new(agent: &'a dyn Agent, resolver: &'a LabelResolver) -> Self {
        Self {
            agent,
            resolver,
            state: SessionState::Idle,
            context: None,
            started: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> Option<&TransactionContext> {
        self.context.as_ref()
    }

    /// Open the transaction.
    ///
    /// Returns false when the agent could not start one; the session is then
    /// inert and the handler must run without instrumentation.
    pub fn begin(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return self.state == SessionState::Began;
        }

        match self.agent.begin_transaction() {
            Ok(transaction_id) => {
                debug!(
                    target: "agent.middleware.session",
                    transaction_id = %transaction_id,
                    "Transaction started"
                );
                self.context = Some(TransactionContext::new(transaction_id));
                self.started = Some(Instant::now());
                self.state = SessionState::Began;
                true
            }
            Err(e) => {
                report_failure("begin_transaction", None, &e);
                warn!(
                    target: "agent.middleware.session",
                    "Skipping instrumentation for this request"
                );
                record_transaction_skipped();
                self.state = SessionState::Ended;
                false
            }
        }
    }

    /// Close the transaction after the handler produced a response.
    ///
    /// 4xx responses are reported as errors and named after the raw path;
    /// anything else is named after the resolved label.
    pub fn complete(&mut self, request_path: &str, status: StatusCode, route: Option<&RouteValues>) {
        let Some(transaction_id) = self.open_transaction() else {
            return;
        };

        let outcome = if status.is_client_error() {
            let error_type = format!("HttpError {}", status.as_u16());
            let message = status
                .canonical_reason()
                .map_or_else(|| status.as_u16().to_string(), str::to_string);
            self.check(
                "notice_error",
                self.agent
                    .notice_error(transaction_id, &error_type, &message, ""),
            );
            self.name(transaction_id, request_path.to_string());
            Outcome::ClientError
        } else {
            let label = self.label(request_path, route);
            self.name(transaction_id, label);
            Outcome::Success
        };

        self.state = SessionState::Completed;
        self.end(outcome);
    }

    /// Close the transaction after the handler failed.
    ///
    /// The caller propagates the original failure afterwards.
    pub fn fail(&mut self, request_path: &str, route: Option<&RouteValues>, failure: &HandlerFailure) {
        let Some(transaction_id) = self.open_transaction() else {
            return;
        };

        let label = self.label(request_path, route);
        self.name(transaction_id, label);
        self.check(
            "notice_error",
            self.agent.notice_error(
                transaction_id,
                failure.error_type(),
                failure.message(),
                failure.stack_trace(),
            ),
        );

        self.state = SessionState::Failed;
        self.end(Outcome::Failure);
    }

    fn open_transaction(&self) -> Option<TransactionId> {
        match (self.state, &self.context) {
            (SessionState::Began, Some(context)) => Some(context.transaction_id),
            _ => None,
        }
    }

    fn label(&self, request_path: &str, route: Option<&RouteValues>) -> String {
        match route {
            Some(route) => self
                .resolver
                .resolve(route.controller(), route.action(), request_path),
            None => request_path.to_string(),
        }
    }

    fn name(&mut self, transaction_id: TransactionId, label: String) {
        self.check(
            "set_transaction_name",
            self.agent.set_transaction_name(transaction_id, &label),
        );
        if let Some(context) = self.context.as_mut() {
            context.label = Some(label);
        }
    }

    fn end(&mut self, outcome: Outcome) {
        if let Some(transaction_id) = self.context.as_ref().map(|c| c.transaction_id) {
            self.check("end_transaction", self.agent.end_transaction(transaction_id));
            debug!(
                target: "agent.middleware.session",
                transaction_id = %transaction_id,
                outcome = outcome.as_str(),
                "Transaction ended"
            );
        }

        self.state = SessionState::Ended;
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        record_transaction(outcome, elapsed);
    }

    fn check(&self, operation: &'static str, result: Result<(), AgentError>) {
        if let Err(e) = result {
            report_failure(
                operation,
                self.context.as_ref().map(|c| c.transaction_id),
                &e,
            );
        }
    }
}

impl Drop for InstrumentationSession<'_> {
    fn drop(&mut self) {
        if self.state == SessionState::Began {
            warn!(
                target: "agent.middleware.session",
                "Request dropped with an open transaction"
            );
            self.end(Outcome::Cancelled);
        }
    }
}

fn report_failure(operation: &'static str, transaction_id: Option<TransactionId>, e: &AgentError) {
    record_agent_call_failure(operation);
    let transaction_id = transaction_id.map(TransactionId::get);
    if e.is_invalid_argument() {
        error!(
            target: "agent.middleware.session",
            operation,
            transaction_id,
            error = %e,
            "Agent rejected an invalid argument"
        );
        // Every argument the session builds is non-blank, so this is a bug
        // in the caller and must not pass unnoticed in debug builds.
        debug_assert!(
            !e.is_invalid_argument(),
            "agent rejected an invalid argument in {operation}: {e}"
        );
    } else {
        error!(
            target: "agent.middleware.session",
            operation,
            transaction_id,
            error = %e,
            "Agent call failed"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::agent::{AgentCall, MockAgent};
    use std::sync::Arc;
    use txn_labeller::{InMemoryMappingStore, RuleSnapshot};

    const VALUES_MAPPING: &str = r#"[
        {"actionRoute": "valuescontroller/get",
         "pathMappings": [{"pattern": "get/[0-9]+$", "label": "get/:id"}]}
    ]"#;

    fn resolver() -> LabelResolver {
        let snapshot = RuleSnapshot::from_json(VALUES_MAPPING).unwrap();
        LabelResolver::new(Arc::new(InMemoryMappingStore::new(snapshot)))
    }

    fn id(raw: i64) -> TransactionId {
        TransactionId::new(raw).unwrap()
    }

    fn values_route() -> RouteValues {
        RouteValues::new("valuescontroller", "get")
    }

    #[test]
    fn test_success_names_with_resolved_label() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        assert!(session.begin());
        assert_eq!(session.state(), SessionState::Began);
        session.complete("/api/values/get/42", StatusCode::OK, Some(&values_route()));

        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(session.context().unwrap().label(), Some("get/:id"));
        assert_eq!(
            agent.calls(),
            vec![
                AgentCall::BeginTransaction,
                AgentCall::SetTransactionName {
                    transaction_id: id(1),
                    name: "get/:id".to_string()
                },
                AgentCall::EndTransaction {
                    transaction_id: id(1)
                },
            ]
        );
    }

    #[test]
    fn test_unmatched_path_falls_back_to_path() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete("/api/values/get/abc", StatusCode::OK, Some(&values_route()));

        assert_eq!(
            session.context().unwrap().label(),
            Some("/api/values/get/abc")
        );
    }

    #[test]
    fn test_missing_route_values_use_path() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete("/api/values/get/42", StatusCode::OK, None);

        assert_eq!(session.context().unwrap().label(), Some("/api/values/get/42"));
    }

    #[test]
    fn test_client_error_notices_then_names_raw_path() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete(
            "/api/values/get/42",
            StatusCode::NOT_FOUND,
            Some(&values_route()),
        );

        assert_eq!(
            agent.calls(),
            vec![
                AgentCall::BeginTransaction,
                AgentCall::NoticeError {
                    transaction_id: id(1),
                    error_type: "HttpError 404".to_string(),
                    error_message: "Not Found".to_string(),
                    stack_trace: String::new(),
                },
                AgentCall::SetTransactionName {
                    transaction_id: id(1),
                    name: "/api/values/get/42".to_string()
                },
                AgentCall::EndTransaction {
                    transaction_id: id(1)
                },
            ]
        );
    }

    #[test]
    fn test_unknown_client_error_reason_uses_status_code() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete("/x", StatusCode::from_u16(499).unwrap(), None);

        let notice = agent.calls().into_iter().nth(1).unwrap();
        assert_eq!(
            notice,
            AgentCall::NoticeError {
                transaction_id: id(1),
                error_type: "HttpError 499".to_string(),
                error_message: "499".to_string(),
                stack_trace: String::new(),
            }
        );
    }

    #[test]
    fn test_server_error_status_is_not_noticed() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete("/api/values/get/1", StatusCode::INTERNAL_SERVER_ERROR, Some(&values_route()));

        assert_eq!(
            agent.operations(),
            ["begin_transaction", "set_transaction_name", "end_transaction"]
        );
    }

    #[test]
    fn test_failure_names_notices_and_ends() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);
        let failure = HandlerFailure::new("DbError", "connection refused", "");

        session.begin();
        session.fail("/api/values/get/7", Some(&values_route()), &failure);

        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(
            agent.calls(),
            vec![
                AgentCall::BeginTransaction,
                AgentCall::SetTransactionName {
                    transaction_id: id(1),
                    name: "get/:id".to_string()
                },
                AgentCall::NoticeError {
                    transaction_id: id(1),
                    error_type: "DbError".to_string(),
                    error_message: "connection refused".to_string(),
                    stack_trace: String::new(),
                },
                AgentCall::EndTransaction {
                    transaction_id: id(1)
                },
            ]
        );
    }

    #[test]
    fn test_begin_failure_makes_session_inert() {
        let agent = MockAgent::failing_begin();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        assert!(!session.begin());
        assert_eq!(session.state(), SessionState::Ended);
        assert!(session.context().is_none());

        session.complete("/api/values/get/1", StatusCode::OK, Some(&values_route()));
        session.fail("/x", None, &HandlerFailure::new("E", "m", ""));
        drop(session);

        assert_eq!(agent.operations(), ["begin_transaction"]);
    }

    #[test]
    fn test_agent_errors_are_absorbed() {
        let agent = MockAgent::failing_reports();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete("/api/values/get/1", StatusCode::BAD_REQUEST, None);

        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(
            agent.operations(),
            [
                "begin_transaction",
                "notice_error",
                "set_transaction_name",
                "end_transaction"
            ]
        );
    }

    #[test]
    fn test_end_failure_is_absorbed() {
        let agent = MockAgent::failing_end();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete("/", StatusCode::OK, None);
        assert_eq!(session.state(), SessionState::Ended);
    }

    #[test]
    fn test_dropped_session_ends_open_transaction() {
        let agent = MockAgent::new();
        let resolver = resolver();
        {
            let mut session = InstrumentationSession::new(&agent, &resolver);
            session.begin();
        }
        assert_eq!(agent.operations(), ["begin_transaction", "end_transaction"]);
    }

    #[test]
    fn test_outcome_is_reported_once() {
        let agent = MockAgent::new();
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        session.begin();
        session.complete("/", StatusCode::OK, None);
        session.complete("/", StatusCode::OK, None);
        assert!(!session.begin());
        drop(session);

        assert_eq!(agent.call_count(), 3);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct QueryError {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn test_failure_from_error_walks_sources() {
        let err = QueryError {
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
        };
        let failure = HandlerFailure::from_error(&err);

        assert!(failure.error_type().ends_with("QueryError"));
        assert_eq!(failure.message(), "query failed");
        assert_eq!(failure.stack_trace(), "connection refused");
    }

    #[test]
    fn test_failure_from_panic_payload() {
        let payload: Box<dyn Any + Send> = Box::new("index out of range");
        let failure = HandlerFailure::from_panic(payload.as_ref());
        assert_eq!(failure.error_type(), "panic");
        assert_eq!(failure.message(), "index out of range");
        assert_eq!(failure.stack_trace(), "");

        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(HandlerFailure::from_panic(payload.as_ref()).message(), "boom");

        let payload: Box<dyn Any + Send> = Box::new(17_u32);
        assert_eq!(
            HandlerFailure::from_panic(payload.as_ref()).message(),
            "handler panicked"
        );
    }

    /// Agent that accepts everything except transaction names.
    struct RejectingNameAgent;

    impl Agent for RejectingNameAgent {
        fn init(
            &self,
            _license_key: &common::secret::SecretString,
            _app_name: &str,
            _language: &str,
            _language_version: &str,
        ) -> Result<(), AgentError> {
            Ok(())
        }

        fn begin_transaction(&self) -> Result<TransactionId, AgentError> {
            TransactionId::new(7)
        }

        fn set_transaction_name(
            &self,
            _transaction_id: TransactionId,
            _name: &str,
        ) -> Result<(), AgentError> {
            Err(AgentError::InvalidArgument("name must not be blank".to_string()))
        }

        fn notice_error(
            &self,
            _transaction_id: TransactionId,
            _error_type: &str,
            _error_message: &str,
            _stack_trace: &str,
        ) -> Result<(), AgentError> {
            Ok(())
        }

        fn end_transaction(&self, _transaction_id: TransactionId) -> Result<(), AgentError> {
            Ok(())
        }

        fn record_metric(&self, _name: &str, _value: f64) -> Result<(), AgentError> {
            Ok(())
        }

        fn shutdown(&self, _reason: &str) -> Result<(), AgentError> {
            Ok(())
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "agent rejected an invalid argument in set_transaction_name")]
    fn test_invalid_argument_fails_loudly() {
        let agent = RejectingNameAgent;
        let resolver = resolver();
        let mut session = InstrumentationSession::new(&agent, &resolver);

        assert!(session.begin());
        session.complete("/api/values/get/42", StatusCode::OK, Some(&values_route()));
    }
}
