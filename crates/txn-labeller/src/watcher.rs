//! Change detection for the JSON mapping document.
//!
//! Polls the file's modification time and length on an interval and reloads
//! the store when either changes, or when the file appears after being
//! absent. Deleting the file does not clear the rules.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled.

use crate::store::JsonFileMappingStore;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Default interval between file checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest interval the watcher polls at; shorter requests are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What the watcher compares between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileStamp {
    Missing,
    Present {
        modified: Option<SystemTime>,
        len: u64,
    },
}

async fn stamp(path: &Path) -> FileStamp {
    match tokio::fs::metadata(path).await {
        Ok(meta) => FileStamp::Present {
            modified: meta.modified().ok(),
            len: meta.len(),
        },
        Err(_) => FileStamp::Missing,
    }
}

async fn reload(store: &Arc<JsonFileMappingStore>) {
    let reload_store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || reload_store.reload()).await {
        // Outcome already logged by the store
        Ok(_) => {}
        Err(e) => {
            error!(target: "txn.labeller.watcher", error = %e, "Mapping reload task failed");
        }
    }
}

/// Spawn the polling task for `store`.
///
/// `poll_interval` is clamped to at least [`MIN_POLL_INTERVAL`].
pub fn spawn_mapping_watcher(
    store: Arc<JsonFileMappingStore>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let span = tracing::info_span!("txn.labeller.watcher", path = %store.path().display());
    tokio::spawn(watch_mapping_file(store, poll_interval, cancel_token).instrument(span))
}

/// Run the polling loop until `cancel_token` is cancelled.
pub async fn watch_mapping_file(
    store: Arc<JsonFileMappingStore>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
    info!(
        target: "txn.labeller.watcher",
        poll_interval_ms = poll_interval.as_millis() as u64,
        "Mapping watcher started"
    );

    // Writes that landed between the store's initial read and this point
    // would otherwise go unnoticed until the next change.
    let mut last = stamp(store.path()).await;
    if last != FileStamp::Missing {
        reload(&store).await;
    }

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let current = stamp(store.path()).await;
                if current == last {
                    continue;
                }
                last = current;

                if current == FileStamp::Missing {
                    debug!(target: "txn.labeller.watcher", "Mapping document removed, keeping current mappings");
                    continue;
                }

                reload(&store).await;
            }
            _ = cancel_token.cancelled() => {
                info!(target: "txn.labeller.watcher", "Mapping watcher received shutdown signal, exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::store::MappingStore;
    use super::*;

    #[test]
    fn test_default_poll_interval() {
        assert_eq!(DEFAULT_POLL_INTERVAL, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_stamp_tracks_presence_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");

        assert_eq!(stamp(&path).await, FileStamp::Missing);

        std::fs::write(&path, "[]").unwrap();
        let first = stamp(&path).await;
        assert!(matches!(first, FileStamp::Present { len: 2, .. }));

        std::fs::write(&path, "[ ]").unwrap();
        assert_ne!(stamp(&path).await, first);
    }

    #[tokio::test]
    async fn test_watcher_exits_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileMappingStore::open(dir.path().join("mappings.json")));
        let cancel_token = CancellationToken::new();

        let handle = spawn_mapping_watcher(store, Duration::from_millis(10), cancel_token.clone());
        cancel_token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher should stop after cancel")
            .expect("watcher task should not panic");
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        let store = Arc::new(JsonFileMappingStore::open(&path));
        let cancel_token = CancellationToken::new();

        let handle = spawn_mapping_watcher(store.clone(), Duration::ZERO, cancel_token.clone());
        std::fs::write(&path, r#"[{"actionRoute": "values/get", "pathMappings": []}]"#).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.snapshot().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(MIN_POLL_INTERVAL).await;
        }
        assert_eq!(store.snapshot().len(), 1);

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher should stop after cancel")
            .expect("watcher task should not panic");
    }
}
