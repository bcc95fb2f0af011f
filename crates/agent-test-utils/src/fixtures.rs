//! Mapping and configuration fixtures.

use agent_middleware::config::AgentConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use txn_labeller::{InMemoryMappingStore, LabelResolver, RuleSnapshot};

/// Mapping document for the values controller.
///
/// `/api/values/get/{number}` rolls up to `get/:id`; any other path under
/// the action keeps its own name.
pub const VALUES_MAPPING_JSON: &str = r#"[
  {
    "actionRoute": "valuescontroller/get",
    "pathMappings": [
      { "pattern": "get/[0-9]+$", "label": "get/:id" }
    ]
  }
]"#;

/// Parsed [`VALUES_MAPPING_JSON`].
pub fn values_snapshot() -> RuleSnapshot {
    RuleSnapshot::from_json(VALUES_MAPPING_JSON).expect("values mapping fixture must parse")
}

/// In-memory store holding the values mapping, for tests that publish
/// new rules later.
pub fn values_store() -> Arc<InMemoryMappingStore> {
    Arc::new(InMemoryMappingStore::new(values_snapshot()))
}

/// Resolver over a fresh values store.
pub fn values_resolver() -> Arc<LabelResolver> {
    Arc::new(LabelResolver::new(values_store()))
}

/// Resolver over `store`.
pub fn resolver_for(store: Arc<InMemoryMappingStore>) -> Arc<LabelResolver> {
    Arc::new(LabelResolver::new(store))
}

/// Write `json` to `<base_dir>/Mappings/mappings.json` and return its path.
pub fn write_mappings(base_dir: &Path, json: &str) -> PathBuf {
    let dir = base_dir.join("Mappings");
    std::fs::create_dir_all(&dir).expect("create Mappings directory");
    let path = dir.join("mappings.json");
    std::fs::write(&path, json).expect("write mapping document");
    path
}

/// Agent configuration with instrumentation enabled.
pub fn enabled_config() -> AgentConfig {
    let vars = HashMap::from([
        ("APM_LICENSE_KEY".to_string(), "test-license-key".to_string()),
        ("APM_APP_NAME".to_string(), "agent-middleware-tests".to_string()),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
    ]);
    AgentConfig::from_vars(&vars).expect("test configuration must parse")
}
