//! Observability configuration shared by the workspace binaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log directive when neither `RUST_LOG` nor `LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// `LOG_JSON` accepts `1`/`true`/`yes` in any case; anything else is false.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let log_level = vars
            .get("LOG_LEVEL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = vars
            .get("LOG_JSON")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Self {
            log_level,
            json_logs,
        }
    }

    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` wins over `log_level` when present. Returns an error string
    /// if a global subscriber is already installed.
    ///
    /// # Errors
    ///
    /// Returns error if the subscriber cannot be installed.
    pub fn init_tracing(&self) -> Result<(), String> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level.clone()));

        let registry = tracing_subscriber::registry().with(filter);

        let result = if self.json_logs {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
        } else {
            registry.with(tracing_subscriber::fmt::layer()).try_init()
        };

        result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
    }
}
