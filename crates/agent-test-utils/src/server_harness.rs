//! Test server harness for E2E testing
//!
//! Provides `TestAgentServer` for spawning the demonstration service with a
//! recording agent.

use crate::fixtures::enabled_config;
use agent_middleware::agent::MockAgent;
use agent_middleware::middleware::Instrumentation;
use agent_middleware::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use txn_labeller::LabelResolver;

/// Test harness for spawning the demonstration service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<(), anyhow::Error> {
///     let server = TestAgentServer::spawn(values_resolver()).await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestAgentServer {
    addr: SocketAddr,
    agent: Arc<MockAgent>,
    instrumentation: Arc<Instrumentation>,
    _handle: JoinHandle<()>,
}

impl TestAgentServer {
    /// Spawn a server whose agent records every call.
    pub async fn spawn(resolver: Arc<LabelResolver>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_agent(Arc::new(MockAgent::new()), resolver).await
    }

    /// Spawn a server around a specific mock, e.g. one that fails `begin`.
    ///
    /// The server will:
    /// - Initialize instrumentation with an enabled configuration
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with_agent(
        agent: Arc<MockAgent>,
        resolver: Arc<LabelResolver>,
    ) -> Result<Self, anyhow::Error> {
        let instrumentation = Arc::new(Instrumentation::initialize(
            agent.clone(),
            resolver,
            &enabled_config(),
        ));

        let state = Arc::new(AppState {
            instrumentation: Arc::clone(&instrumentation),
        });

        // Handle from an uninstalled recorder: no global state between tests
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            agent,
            instrumentation,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The recording agent behind the server.
    pub fn agent(&self) -> &Arc<MockAgent> {
        &self.agent
    }

    pub fn instrumentation(&self) -> &Arc<Instrumentation> {
        &self.instrumentation
    }
}

impl Drop for TestAgentServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
