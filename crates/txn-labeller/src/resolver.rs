//! Transaction label resolution.
//!
//! Instead of reporting `/values/get/1` and `/values/get/2` as separate
//! transactions, requests are rolled up under the label from the mapping
//! document: the `controller/action` pair selects an action mapping and its
//! path patterns pick the label. Without a match the request path itself is
//! the label.

use crate::models::RuleSnapshot;
use crate::store::MappingStore;
use arc_swap::ArcSwap;
use std::sync::{Arc, Weak};

/// Resolves transaction labels against the latest published rules.
///
/// Holds its own copy of the store's snapshot and swaps it when the store
/// publishes. Lookups load the current pointer without locking, so a
/// concurrent refresh never blocks them and each lookup sees one complete
/// snapshot.
pub struct LabelResolver {
    store: Arc<dyn MappingStore>,
    rules: Arc<ArcSwap<RuleSnapshot>>,
}

impl LabelResolver {
    /// Build a resolver over `store` and subscribe to its changes.
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        let placeholder = Arc::new(RuleSnapshot::empty());
        let rules = Arc::new(ArcSwap::new(Arc::clone(&placeholder)));

        let target: Weak<ArcSwap<RuleSnapshot>> = Arc::downgrade(&rules);
        store.subscribe(Box::new(move |snapshot| match target.upgrade() {
            Some(rules) => {
                rules.store(Arc::new(snapshot));
                true
            }
            None => false,
        }));

        // A publication racing with subscribe() has already replaced the
        // placeholder and must not be overwritten by this older read.
        let _ = rules.compare_and_swap(&placeholder, Arc::new(store.snapshot()));

        Self { store, rules }
    }

    /// Label for a request.
    ///
    /// Returns the label of the first matching path pattern under the
    /// `controller/action` mapping, or `request_path` unchanged when no
    /// mapping or pattern applies.
    #[must_use]
    pub fn resolve(&self, controller: &str, action: &str, request_path: &str) -> String {
        let rules = self.rules.load();
        rules
            .label_for(controller, action, request_path)
            .unwrap_or(request_path)
            .to_string()
    }

    /// The snapshot lookups currently run against.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.rules.load_full()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryMappingStore;

    const SCENARIO: &str = r#"[{"actionRoute": "valuescontroller/get",
        "pathMappings": [{"pattern": "get/[0-9]+$", "label": "get/:id"}]}]"#;

    fn resolver_with(document: &str) -> (Arc<InMemoryMappingStore>, LabelResolver) {
        let store = Arc::new(InMemoryMappingStore::new(
            RuleSnapshot::from_json(document).unwrap(),
        ));
        let resolver = LabelResolver::new(store.clone());
        (store, resolver)
    }

    #[test]
    fn test_matching_pattern_yields_label() {
        let (_, resolver) = resolver_with(SCENARIO);
        assert_eq!(
            resolver.resolve("valuescontroller", "get", "/api/values/get/42"),
            "get/:id"
        );
    }

    #[test]
    fn test_non_matching_pattern_falls_back_to_path() {
        let (_, resolver) = resolver_with(SCENARIO);
        assert_eq!(
            resolver.resolve("valuescontroller", "get", "/api/values/get/abc"),
            "/api/values/get/abc"
        );
    }

    #[test]
    fn test_unknown_route_falls_back_to_path() {
        let (_, resolver) = resolver_with(SCENARIO);
        assert_eq!(
            resolver.resolve("orderscontroller", "get", "/api/orders/get/42"),
            "/api/orders/get/42"
        );
    }

    #[test]
    fn test_route_key_and_pattern_ignore_case() {
        let (_, resolver) = resolver_with(SCENARIO);
        assert_eq!(
            resolver.resolve("ValuesController", "GET", "/API/Values/GET/7"),
            "get/:id"
        );
    }

    #[test]
    fn test_empty_store_returns_path() {
        let store = Arc::new(InMemoryMappingStore::default());
        let resolver = LabelResolver::new(store);
        assert!(resolver.snapshot().is_empty());
        assert_eq!(resolver.resolve("a", "b", "/a/b"), "/a/b");
    }

    #[test]
    fn test_publication_replaces_rules() {
        let (store, resolver) = resolver_with(SCENARIO);

        store.publish(
            RuleSnapshot::from_json(
                r#"[{"actionRoute": "valuescontroller/get",
                    "pathMappings": [{"pattern": "get/.+$", "label": "get/:any"}]}]"#,
            )
            .unwrap(),
        );

        assert_eq!(
            resolver.resolve("valuescontroller", "get", "/api/values/get/abc"),
            "get/:any"
        );
        assert_eq!(
            resolver.resolve("valuescontroller", "get", "/api/values/get/42"),
            "get/:any"
        );
    }

    #[test]
    fn test_dropped_resolver_ignores_publications() {
        let (store, resolver) = resolver_with(SCENARIO);
        drop(resolver);

        // Handler still registered but its target is gone
        store.publish(RuleSnapshot::empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_resolver_keeps_store_handle() {
        let (store, resolver) = resolver_with(SCENARIO);
        assert_eq!(resolver.store().snapshot().len(), store.snapshot().len());
    }
}
