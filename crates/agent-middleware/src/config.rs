//! Agent Middleware configuration.
//!
//! Configuration is loaded from environment variables. The license key is
//! redacted in Debug output.

use common::secret::{is_blank, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default application name reported to the agent.
pub const DEFAULT_APP_NAME: &str = "agent-middleware";

/// Default language reported to the agent.
pub const DEFAULT_LANGUAGE: &str = "Rust";

/// Default directory holding the native SDK libraries.
pub const DEFAULT_LIBRARY_PATH: &str = "/usr/local/lib";

/// Default mapping document location.
pub const DEFAULT_MAPPINGS_FILE: &str = "Mappings/mappings.json";

/// Default mapping change-detection interval in milliseconds.
pub const DEFAULT_MAPPINGS_POLL_MS: u64 = 2000;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Agent Middleware configuration.
#[derive(Clone)]
pub struct AgentConfig {
    /// Whether requests are reported to the agent at all.
    pub enabled: bool,

    /// Agent license key.
    pub license_key: SecretString,

    /// Application name reported to the agent.
    pub app_name: String,

    /// Language reported to the agent (default: "Rust").
    pub language: String,

    /// Language version reported to the agent (default: the crate's rust-version).
    pub language_version: String,

    /// Directory containing the native SDK shared libraries.
    pub library_path: PathBuf,

    /// Path of the JSON mapping document.
    pub mappings_file: PathBuf,

    /// How often the mapping document is checked for changes.
    pub mappings_poll_interval: Duration,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("enabled", &self.enabled)
            .field("license_key", &"[REDACTED]")
            .field("app_name", &self.app_name)
            .field("language", &self.language)
            .field("language_version", &self.language_version)
            .field("library_path", &self.library_path)
            .field("mappings_file", &self.mappings_file)
            .field("mappings_poll_interval", &self.mappings_poll_interval)
            .field("bind_address", &self.bind_address)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl AgentConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let enabled = match vars.get("APM_ENABLED") {
            Some(value) => parse_flag("APM_ENABLED", value)?,
            None => true,
        };

        let license_key = SecretString::from(
            vars.get("APM_LICENSE_KEY").cloned().unwrap_or_default(),
        );
        if enabled && is_blank(&license_key) {
            return Err(ConfigError::MissingEnvVar("APM_LICENSE_KEY".to_string()));
        }

        let app_name = non_blank_or(vars, "APM_APP_NAME", DEFAULT_APP_NAME)?;
        let language = non_blank_or(vars, "APM_LANGUAGE", DEFAULT_LANGUAGE)?;
        let language_version = non_blank_or(
            vars,
            "APM_LANGUAGE_VERSION",
            env!("CARGO_PKG_RUST_VERSION"),
        )?;

        let library_path = PathBuf::from(
            vars.get("APM_LIBRARY_PATH")
                .map(String::as_str)
                .unwrap_or(DEFAULT_LIBRARY_PATH),
        );

        let mappings_file = PathBuf::from(
            vars.get("APM_MAPPINGS_FILE")
                .map(String::as_str)
                .unwrap_or(DEFAULT_MAPPINGS_FILE),
        );

        // Parse poll interval with validation
        let poll_ms = if let Some(value_str) = vars.get("APM_MAPPINGS_POLL_MS") {
            let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
                name: "APM_MAPPINGS_POLL_MS".to_string(),
                reason: format!("must be a valid positive integer, got '{value_str}': {e}"),
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "APM_MAPPINGS_POLL_MS".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }

            value
        } else {
            DEFAULT_MAPPINGS_POLL_MS
        };

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        Ok(Self {
            enabled,
            license_key,
            app_name,
            language,
            language_version,
            library_path,
            mappings_file,
            mappings_poll_interval: Duration::from_millis(poll_ms),
            bind_address,
        })
    }

    /// Defaults with instrumentation switched off.
    ///
    /// Used when the environment cannot be parsed: the service still runs,
    /// only without reporting.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            license_key: SecretString::from(String::new()),
            app_name: DEFAULT_APP_NAME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            language_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            library_path: PathBuf::from(DEFAULT_LIBRARY_PATH),
            mappings_file: PathBuf::from(DEFAULT_MAPPINGS_FILE),
            mappings_poll_interval: Duration::from_millis(DEFAULT_MAPPINGS_POLL_MS),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn non_blank_or(
    vars: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match vars.get(name) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must not be blank".to_string(),
        }),
        Some(value) => Ok(value.clone()),
        None => Ok(default.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("APM_LICENSE_KEY".to_string(), "license-123".to_string())])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = AgentConfig::from_vars(&base_vars()).unwrap();

        assert!(config.enabled);
        assert_eq!(config.license_key.expose_secret(), "license-123");
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert_eq!(config.language, "Rust");
        assert_eq!(config.language_version, env!("CARGO_PKG_RUST_VERSION"));
        assert_eq!(config.library_path, PathBuf::from("/usr/local/lib"));
        assert_eq!(config.mappings_file, PathBuf::from("Mappings/mappings.json"));
        assert_eq!(config.mappings_poll_interval, Duration::from_secs(2));
        assert_eq!(config.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_from_vars_overrides() {
        let mut vars = base_vars();
        vars.insert("APM_APP_NAME".to_string(), "orders-api".to_string());
        vars.insert("APM_LIBRARY_PATH".to_string(), "/opt/apm/lib".to_string());
        vars.insert("APM_MAPPINGS_FILE".to_string(), "/etc/apm/map.json".to_string());
        vars.insert("APM_MAPPINGS_POLL_MS".to_string(), "250".to_string());
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());

        let config = AgentConfig::from_vars(&vars).unwrap();
        assert_eq!(config.app_name, "orders-api");
        assert_eq!(config.library_path, PathBuf::from("/opt/apm/lib"));
        assert_eq!(config.mappings_file, PathBuf::from("/etc/apm/map.json"));
        assert_eq!(config.mappings_poll_interval, Duration::from_millis(250));
        assert_eq!(config.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_license_key_required_when_enabled() {
        let result = AgentConfig::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "APM_LICENSE_KEY"));

        let vars = HashMap::from([("APM_LICENSE_KEY".to_string(), "   ".to_string())]);
        assert!(AgentConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn test_license_key_optional_when_disabled() {
        let vars = HashMap::from([("APM_ENABLED".to_string(), "false".to_string())]);
        let config = AgentConfig::from_vars(&vars).unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn test_enabled_flag_parsing() {
        for (value, expected) in [("1", true), ("YES", true), ("off", false), ("0", false)] {
            let mut vars = base_vars();
            vars.insert("APM_ENABLED".to_string(), value.to_string());
            assert_eq!(AgentConfig::from_vars(&vars).unwrap().enabled, expected);
        }

        let mut vars = base_vars();
        vars.insert("APM_ENABLED".to_string(), "maybe".to_string());
        assert!(matches!(
            AgentConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_poll_interval() {
        for value in ["0", "-5", "soon"] {
            let mut vars = base_vars();
            vars.insert("APM_MAPPINGS_POLL_MS".to_string(), value.to_string());
            assert!(matches!(
                AgentConfig::from_vars(&vars),
                Err(ConfigError::InvalidValue { ref name, .. }) if name == "APM_MAPPINGS_POLL_MS"
            ));
        }
    }

    #[test]
    fn test_blank_app_name_rejected() {
        let mut vars = base_vars();
        vars.insert("APM_APP_NAME".to_string(), " ".to_string());
        assert!(AgentConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn test_debug_redacts_license_key() {
        let config = AgentConfig::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("license-123"));
    }

    #[test]
    fn test_disabled_defaults() {
        let config = AgentConfig::disabled();
        assert!(!config.enabled);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
    }
}
