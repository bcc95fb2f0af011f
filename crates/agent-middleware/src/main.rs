//! Agent Middleware demonstration service
//!
//! Serves the values API with every request reported to the native APM
//! agent, labelled through the hot-reloaded mapping document.

use agent_middleware::agent::{Agent, NativeAgent};
use agent_middleware::config::AgentConfig;
use agent_middleware::middleware::Instrumentation;
use agent_middleware::observability::init_metrics_recorder;
use agent_middleware::routes::{self, AppState};
use common::config::ObservabilityConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use txn_labeller::{spawn_mapping_watcher, JsonFileMappingStore, LabelResolver, MappingStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    ObservabilityConfig::from_env().init_tracing()?;

    info!("Starting Agent Middleware");

    // Configuration problems disable reporting, never the service
    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        error!("Invalid agent configuration, instrumentation disabled: {}", e);
        AgentConfig::disabled()
    });

    info!(
        enabled = config.enabled,
        app_name = %config.app_name,
        bind_address = %config.bind_address,
        mappings_file = %config.mappings_file.display(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Mapping document, change detection and resolver
    let store = Arc::new(JsonFileMappingStore::open(&config.mappings_file));
    let cancel_token = CancellationToken::new();
    let watcher = spawn_mapping_watcher(
        Arc::clone(&store),
        config.mappings_poll_interval,
        cancel_token.child_token(),
    );
    let resolver = Arc::new(LabelResolver::new(store as Arc<dyn MappingStore>));

    let agent: Arc<dyn Agent> = Arc::new(NativeAgent::new(&config.library_path));
    let instrumentation = Arc::new(Instrumentation::initialize(agent, resolver, &config));

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState {
        instrumentation: Arc::clone(&instrumentation),
    });
    let app = routes::build_routes(state, metrics_handle);

    info!("Agent Middleware listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cancel_token.cancel();
    if tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .is_err()
    {
        warn!("Mapping watcher did not stop within 5 seconds");
    }

    instrumentation.shutdown("service shutting down");

    info!("Agent Middleware shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
