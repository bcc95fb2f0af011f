//! Shared instrumentation state.
//!
//! One [`Instrumentation`] is built at startup and shared by every request.
//! It decides once whether requests are reported at all, then wraps each
//! handler future in an [`InstrumentationSession`].

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::models::RouteValues;
use crate::observability::metrics::{record_agent_call_failure, set_instrumentation_enabled};
use crate::session::{HandlerFailure, InstrumentationSession};
use axum::http::Response;
use futures::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, instrument};
use txn_labeller::LabelResolver;

/// True when the native agent exists for the platform this binary targets.
pub const PLATFORM_SUPPORTED: bool = cfg!(target_os = "linux");

/// Whether instrumentation should engage.
pub fn should_engage(config_enabled: bool, platform_supported: bool) -> bool {
    config_enabled && platform_supported
}

/// Agent, resolver and the process-wide enable decision.
pub struct Instrumentation {
    agent: Arc<dyn Agent>,
    resolver: Arc<LabelResolver>,
    enabled: bool,
}

impl Instrumentation {
    /// Initialize the agent if instrumentation should engage.
    ///
    /// Never fails: a disabled flag, an unsupported platform or a failed
    /// `init` all leave instrumentation off for the life of the process and
    /// requests pass straight through.
    #[instrument(skip_all, name = "agent.middleware.initialize")]
    pub fn initialize(
        agent: Arc<dyn Agent>,
        resolver: Arc<LabelResolver>,
        config: &AgentConfig,
    ) -> Self {
        let enabled = if !should_engage(config.enabled, PLATFORM_SUPPORTED) {
            info!(
                target: "agent.middleware",
                config_enabled = config.enabled,
                platform_supported = PLATFORM_SUPPORTED,
                "Request instrumentation disabled"
            );
            false
        } else {
            match agent.init(
                &config.license_key,
                &config.app_name,
                &config.language,
                &config.language_version,
            ) {
                Ok(()) => {
                    info!(
                        target: "agent.middleware",
                        app_name = %config.app_name,
                        "Request instrumentation enabled"
                    );
                    true
                }
                Err(e) => {
                    record_agent_call_failure("init");
                    error!(
                        target: "agent.middleware",
                        error = %e,
                        "Agent initialization failed, request instrumentation disabled"
                    );
                    false
                }
            }
        };

        set_instrumentation_enabled(enabled);
        Self {
            agent,
            resolver,
            enabled,
        }
    }

    /// Instrumentation that never reports.
    pub fn disabled(agent: Arc<dyn Agent>, resolver: Arc<LabelResolver>) -> Self {
        Self {
            agent,
            resolver,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub fn resolver(&self) -> &Arc<LabelResolver> {
        &self.resolver
    }

    /// A fresh session for one request.
    pub fn session(&self) -> InstrumentationSession<'_> {
        InstrumentationSession::new(self.agent.as_ref(), self.resolver.as_ref())
    }

    /// Run `handler` for the request at `request_path` inside a transaction.
    ///
    /// `request_route` holds route values known before dispatch; values the
    /// handler attached to its response take precedence. Handler errors and
    /// panics are reported, then returned or resumed unchanged.
    pub async fn run<F, B, E>(
        &self,
        request_path: &str,
        request_route: Option<RouteValues>,
        handler: F,
    ) -> Result<Response<B>, E>
    where
        F: Future<Output = Result<Response<B>, E>>,
        E: std::error::Error,
    {
        if !self.enabled {
            return handler.await;
        }

        let mut session = self.session();
        if !session.begin() {
            return handler.await;
        }

        match AssertUnwindSafe(handler).catch_unwind().await {
            Ok(Ok(response)) => {
                let route = response
                    .extensions()
                    .get::<RouteValues>()
                    .or(request_route.as_ref());
                session.complete(request_path, response.status(), route);
                Ok(response)
            }
            Ok(Err(e)) => {
                session.fail(
                    request_path,
                    request_route.as_ref(),
                    &HandlerFailure::from_error(&e),
                );
                Err(e)
            }
            Err(payload) => {
                session.fail(
                    request_path,
                    request_route.as_ref(),
                    &HandlerFailure::from_panic(payload.as_ref()),
                );
                drop(session);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Ask the agent to flush and stop. No-op when disabled.
    pub fn shutdown(&self, reason: &str) {
        if !self.enabled {
            return;
        }
        match self.agent.shutdown(reason) {
            Ok(()) => info!(target: "agent.middleware", reason, "Agent shut down"),
            Err(e) => {
                record_agent_call_failure("shutdown");
                error!(target: "agent.middleware", error = %e, "Agent shutdown failed");
            }
        }
    }
}
