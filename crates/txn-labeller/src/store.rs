//! Mapping stores.
//!
//! A store owns the current [`RuleSnapshot`] and tells subscribers when a new
//! one is published. How changes are detected (file polling, push, a test
//! calling `publish`) is the store's business; consumers only see
//! `snapshot()` and `subscribe()`.

use crate::errors::MappingError;
use crate::models::RuleSnapshot;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default directory holding the mapping document, relative to the working directory.
pub const DEFAULT_MAPPINGS_DIR: &str = "Mappings";

/// Default mapping document file name.
pub const DEFAULT_MAPPINGS_FILE: &str = "mappings.json";

/// Callback invoked with every newly published snapshot.
///
/// Handlers run on the publisher's thread and must not block; swapping a
/// pointer is the intended amount of work. Returning `false` unsubscribes
/// the handler, which the store drops before the next publication.
pub type ChangeHandler = Box<dyn Fn(RuleSnapshot) -> bool + Send + Sync>;

/// Source of label rules.
pub trait MappingStore: Send + Sync {
    /// The most recently published rules.
    fn snapshot(&self) -> RuleSnapshot;

    /// Register a handler for future publications.
    fn subscribe(&self, handler: ChangeHandler);
}

/// Current snapshot plus the handlers to notify when it changes.
#[derive(Default)]
struct Publisher {
    current: ArcSwap<RuleSnapshot>,
    handlers: RwLock<Vec<ChangeHandler>>,
}

impl Publisher {
    fn new(initial: RuleSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            handlers: RwLock::new(Vec::new()),
        }
    }

    fn current(&self) -> RuleSnapshot {
        RuleSnapshot::clone(&self.current.load())
    }

    fn subscribe(&self, handler: ChangeHandler) {
        self.handlers.write().push(handler);
    }

    /// Store first, then notify, so a subscriber that re-reads `current()`
    /// from inside its handler sees the new rules.
    fn publish(&self, snapshot: RuleSnapshot) {
        self.current.store(Arc::new(snapshot.clone()));
        let mut handlers = self.handlers.write();
        handlers.retain(|handler| handler(snapshot.clone()));
    }

    #[cfg(test)]
    fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

/// Rules loaded from a JSON mapping document on disk.
///
/// The document is read once at construction. A missing or malformed file at
/// that point is logged and yields an empty snapshot; instrumentation keeps
/// working with request paths as labels. Later reloads (see
/// [`crate::watcher`]) that fail keep the previous rules.
pub struct JsonFileMappingStore {
    path: PathBuf,
    publisher: Publisher,
}

impl JsonFileMappingStore {
    /// Load `path` and build the store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = match read_document(&path) {
            Ok(snapshot) => {
                info!(
                    target: "txn.labeller.store",
                    path = %path.display(),
                    rule_count = snapshot.len(),
                    "Loaded transaction label mappings"
                );
                snapshot
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    target: "txn.labeller.store",
                    path = %path.display(),
                    "Mapping document not found, request paths will be used as labels"
                );
                RuleSnapshot::empty()
            }
            Err(e) => {
                error!(
                    target: "txn.labeller.store",
                    path = %path.display(),
                    error = %e,
                    "Failed to load mapping document, request paths will be used as labels"
                );
                RuleSnapshot::empty()
            }
        };

        Self {
            path,
            publisher: Publisher::new(initial),
        }
    }

    /// Store reading `Mappings/mappings.json` under `base_dir`.
    pub fn open_in(base_dir: impl AsRef<Path>) -> Self {
        Self::open(
            base_dir
                .as_ref()
                .join(DEFAULT_MAPPINGS_DIR)
                .join(DEFAULT_MAPPINGS_FILE),
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the document and publish it to subscribers.
    ///
    /// Blocking file I/O; call from a blocking-capable context.
    ///
    /// # Errors
    ///
    /// Returns the read or parse error. The previously published rules stay
    /// in place.
    pub fn reload(&self) -> Result<RuleSnapshot, MappingError> {
        match read_document(&self.path) {
            Ok(snapshot) => {
                info!(
                    target: "txn.labeller.store",
                    path = %self.path.display(),
                    rule_count = snapshot.len(),
                    "Reloaded transaction label mappings"
                );
                self.publisher.publish(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                error!(
                    target: "txn.labeller.store",
                    path = %self.path.display(),
                    error = %e,
                    "Failed to reload mapping document, keeping previous mappings"
                );
                Err(e)
            }
        }
    }
}

impl MappingStore for JsonFileMappingStore {
    fn snapshot(&self) -> RuleSnapshot {
        self.publisher.current()
    }

    fn subscribe(&self, handler: ChangeHandler) {
        self.publisher.subscribe(handler);
    }
}

fn read_document(path: &Path) -> Result<RuleSnapshot, MappingError> {
    let json = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    RuleSnapshot::from_json(&json)
}

/// Rules held in memory and replaced by calling [`InMemoryMappingStore::publish`].
///
/// For hosts that build their rules in code, and for tests.
#[derive(Default)]
pub struct InMemoryMappingStore {
    publisher: Publisher,
}

impl InMemoryMappingStore {
    #[must_use]
    pub fn new(initial: RuleSnapshot) -> Self {
        Self {
            publisher: Publisher::new(initial),
        }
    }

    /// Replace the rules and notify subscribers.
    pub fn publish(&self, snapshot: RuleSnapshot) {
        debug!(
            target: "txn.labeller.store",
            rule_count = snapshot.len(),
            "Publishing in-memory mappings"
        );
        self.publisher.publish(snapshot);
    }
}

impl MappingStore for InMemoryMappingStore {
    fn snapshot(&self) -> RuleSnapshot {
        self.publisher.current()
    }

    fn subscribe(&self, handler: ChangeHandler) {
        self.publisher.subscribe(handler);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DOCUMENT: &str = r#"[{"actionRoute": "values/get",
        "pathMappings": [{"pattern": "get/[0-9]+$", "label": "get/:id"}]}]"#;

    #[test]
    fn test_open_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        std::fs::write(&path, DOCUMENT).unwrap();

        let store = JsonFileMappingStore::open(&path);
        assert_eq!(store.path(), path.as_path());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_open_in_uses_default_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(DEFAULT_MAPPINGS_DIR)).unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_MAPPINGS_DIR).join(DEFAULT_MAPPINGS_FILE),
            DOCUMENT,
        )
        .unwrap();

        let store = JsonFileMappingStore::open_in(dir.path());
        assert_eq!(store.snapshot().len(), 1);
        assert!(store.path().ends_with("Mappings/mappings.json"));
    }

    #[test]
    fn test_missing_file_yields_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileMappingStore::open(dir.path().join("absent.json"));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_malformed_file_yields_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileMappingStore::open(&path);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_reload_notifies_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        std::fs::write(&path, "[]").unwrap();

        let store = JsonFileMappingStore::open(&path);
        let notified = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&notified);
        store.subscribe(Box::new(move |snapshot| {
            seen.store(snapshot.len(), Ordering::SeqCst);
            true
        }));

        std::fs::write(&path, DOCUMENT).unwrap();
        let reloaded = store.reload().unwrap();

        assert_eq!(reloaded.len(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_previous_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        std::fs::write(&path, DOCUMENT).unwrap();

        let store = JsonFileMappingStore::open(&path);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        store.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));

        std::fs::write(&path, "[{\"actionRoute\": ").unwrap();
        assert!(store.reload().is_err());

        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_in_memory_publish_reaches_every_subscriber() {
        let store = InMemoryMappingStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&calls);
            store.subscribe(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }));
        }

        store.publish(RuleSnapshot::from_json(DOCUMENT).unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_unsubscribed_handlers_are_dropped() {
        let store = InMemoryMappingStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        store.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }));
        store.subscribe(Box::new(|_| true));

        store.publish(RuleSnapshot::empty());
        store.publish(RuleSnapshot::empty());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.publisher.handler_count(), 1);
    }

    #[test]
    fn test_dropped_resolver_is_unsubscribed() {
        let store = Arc::new(InMemoryMappingStore::default());
        let kept = crate::resolver::LabelResolver::new(store.clone());
        drop(crate::resolver::LabelResolver::new(store.clone()));
        assert_eq!(store.publisher.handler_count(), 2);

        store.publish(RuleSnapshot::from_json(DOCUMENT).unwrap());

        assert_eq!(store.publisher.handler_count(), 1);
        assert_eq!(kept.snapshot().len(), 1);
    }
}
