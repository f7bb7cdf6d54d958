//! In-process location store.
//!
//! Keeps documents in a map and pushes changes to subscribers over
//! per-subscription channels, each drained by its own task. Behaves like a
//! hosted document store from the engine's point of view: a subscription
//! immediately delivers the current state of the document, then every
//! subsequent change, in order.
//!
//! Used by the integration tests and by the CLI `replay` command. Failures
//! can be injected per subject to exercise the engine's error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::traits::{BoxFuture, DocumentSnapshot, LocationStore, SnapshotCallback, StoreError};

type Notification = Result<DocumentSnapshot, StoreError>;

/// One open subscription.
struct Watcher {
    cancellation: CancellationToken,
    tx: mpsc::UnboundedSender<Notification>,
}

impl Watcher {
    fn is_open(&self) -> bool {
        !self.cancellation.is_cancelled() && !self.tx.is_closed()
    }
}

/// Location store held entirely in memory.
///
/// Subscriptions spawn a task on the current Tokio runtime, so `subscribe`
/// must be called from within one.
#[derive(Default)]
pub struct MemoryLocationStore {
    /// Current documents keyed by subject id.
    documents: RwLock<HashMap<String, DocumentSnapshot>>,

    /// Open subscriptions keyed by subject id.
    watchers: Mutex<HashMap<String, Vec<Watcher>>>,

    /// Injected fetch failures keyed by subject id.
    fetch_failures: Mutex<HashMap<String, StoreError>>,

    /// Artificial latency applied to every fetch.
    fetch_delay: Option<Duration>,

    fetch_count: AtomicU64,
    subscribe_count: AtomicU64,
}

impl MemoryLocationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `fetch_once` by the given duration.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Write a location document for the subject and notify subscribers.
    ///
    /// The document id is the subject id.
    pub fn put_location(
        &self,
        subject_id: &str,
        latitude: f64,
        longitude: f64,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let snapshot = DocumentSnapshot::location(subject_id, latitude, longitude, timestamp);
        self.put_document(subject_id, snapshot);
    }

    /// Store an arbitrary document for the subject and notify subscribers.
    pub fn put_document(&self, subject_id: &str, snapshot: DocumentSnapshot) {
        self.documents
            .write()
            .insert(subject_id.to_string(), snapshot.clone());
        self.notify(subject_id, Ok(snapshot));
    }

    /// Delete the subject's document and notify subscribers.
    ///
    /// Returns whether a document existed.
    pub fn delete(&self, subject_id: &str) -> bool {
        let existed = self.documents.write().remove(subject_id).is_some();
        self.notify(subject_id, Ok(DocumentSnapshot::missing(subject_id)));
        existed
    }

    /// Make every fetch for the subject fail until cleared.
    pub fn fail_fetch(&self, subject_id: &str, error: StoreError) {
        self.fetch_failures
            .lock()
            .insert(subject_id.to_string(), error);
    }

    /// Stop failing fetches for the subject.
    pub fn clear_fetch_failure(&self, subject_id: &str) {
        self.fetch_failures.lock().remove(subject_id);
    }

    /// Deliver a subscription-level error to the subject's subscribers.
    pub fn push_subscription_error(&self, subject_id: &str, error: StoreError) {
        self.notify(subject_id, Err(error));
    }

    /// Current document for the subject, if any.
    pub fn document(&self, subject_id: &str) -> Option<DocumentSnapshot> {
        self.documents.read().get(subject_id).cloned()
    }

    /// Number of subscriptions to the subject that are still open.
    pub fn open_subscriptions(&self, subject_id: &str) -> usize {
        self.watchers
            .lock()
            .get(subject_id)
            .map(|watchers| watchers.iter().filter(|w| w.is_open()).count())
            .unwrap_or(0)
    }

    /// Total number of `fetch_once` calls served.
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Total number of `subscribe` calls served.
    pub fn subscribe_count(&self) -> u64 {
        self.subscribe_count.load(Ordering::Relaxed)
    }

    fn notify(&self, subject_id: &str, notification: Notification) {
        let mut watchers = self.watchers.lock();
        let Some(list) = watchers.get_mut(subject_id) else {
            return;
        };

        list.retain(Watcher::is_open);
        for watcher in list.iter() {
            // Receiver may have gone away between retain and send
            let _ = watcher.tx.send(notification.clone());
        }
        trace!(subject_id, subscribers = list.len(), "Notified subscribers");

        if list.is_empty() {
            watchers.remove(subject_id);
        }
    }
}

impl LocationStore for MemoryLocationStore {
    fn fetch_once(&self, subject_id: &str) -> BoxFuture<'_, Result<DocumentSnapshot, StoreError>> {
        let subject_id = subject_id.to_string();
        Box::pin(async move {
            if let Some(delay) = self.fetch_delay {
                tokio::time::sleep(delay).await;
            }
            self.fetch_count.fetch_add(1, Ordering::Relaxed);

            if let Some(error) = self.fetch_failures.lock().get(&subject_id) {
                return Err(error.clone());
            }

            Ok(self
                .document(&subject_id)
                .unwrap_or_else(|| DocumentSnapshot::missing(subject_id.as_str())))
        })
    }

    fn subscribe(
        &self,
        subject_id: &str,
        cancellation: CancellationToken,
        on_event: SnapshotCallback,
    ) {
        self.subscribe_count.fetch_add(1, Ordering::Relaxed);

        let (tx, mut rx) = mpsc::unbounded_channel();

        // Initial state, delivered before any later change. Registration and
        // the initial send happen under the watchers lock so a concurrent
        // write cannot slip in between.
        {
            let mut watchers = self.watchers.lock();
            let initial = self
                .document(subject_id)
                .unwrap_or_else(|| DocumentSnapshot::missing(subject_id));
            let _ = tx.send(Ok(initial));
            watchers
                .entry(subject_id.to_string())
                .or_default()
                .push(Watcher {
                    cancellation: cancellation.clone(),
                    tx,
                });
        }

        let subject = subject_id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancellation.cancelled() => {
                        debug!(subject_id = %subject, "Memory store subscription cancelled");
                        break;
                    }

                    notification = rx.recv() => match notification {
                        Some(notification) => on_event(notification),
                        None => break,
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn collecting_callback() -> (SnapshotCallback, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SnapshotCallback = Arc::new(move |n: Notification| {
            let _ = tx.send(n);
        });
        (callback, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Timeout waiting for notification")
            .expect("Channel closed")
    }

    #[tokio::test]
    async fn test_fetch_missing_document() {
        let store = MemoryLocationStore::new();
        let snapshot = store.fetch_once("u1").await.unwrap();
        assert!(!snapshot.exists());
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_existing_document() {
        let store = MemoryLocationStore::new();
        store.put_location("u1", 48.85, 2.35, None);

        let snapshot = store.fetch_once("u1").await.unwrap();
        assert!(snapshot.exists());
        assert_eq!(snapshot.id(), "u1");
    }

    #[tokio::test]
    async fn test_fetch_failure_injection() {
        let store = MemoryLocationStore::new();
        store.put_location("u1", 48.85, 2.35, None);
        store.fail_fetch("u1", StoreError::Unavailable("maintenance".to_string()));

        let result = store.fetch_once("u1").await;
        assert_eq!(
            result,
            Err(StoreError::Unavailable("maintenance".to_string()))
        );

        store.clear_fetch_failure("u1");
        assert!(store.fetch_once("u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_then_changes() {
        let store = MemoryLocationStore::new();
        store.put_location("u1", 48.85, 2.35, None);

        let (callback, mut rx) = collecting_callback();
        store.subscribe("u1", CancellationToken::new(), callback);

        let initial = next(&mut rx).await.unwrap();
        assert!(initial.exists());

        store.put_location("u1", 45.75, 4.83, None);
        let update = next(&mut rx).await.unwrap();
        assert_eq!(update.get_f64("latitude"), Ok(Some(45.75)));

        store.delete("u1");
        let removed = next(&mut rx).await.unwrap();
        assert!(!removed.exists());

        store.push_subscription_error("u1", StoreError::Network("reset".to_string()));
        assert!(next(&mut rx).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_subscription_stops_delivery() {
        let store = MemoryLocationStore::new();
        let token = CancellationToken::new();
        let (callback, mut rx) = collecting_callback();
        store.subscribe("u1", token.clone(), callback);

        // Initial (missing) snapshot
        assert!(!next(&mut rx).await.unwrap().exists());
        assert_eq!(store.open_subscriptions("u1"), 1);

        token.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.open_subscriptions("u1"), 0);

        store.put_location("u1", 1.0, 2.0, None);
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(
            matches!(late, Err(_) | Ok(None)),
            "No notification expected after cancellation"
        );
    }

    #[tokio::test]
    async fn test_fetch_delay() {
        let store = MemoryLocationStore::new().with_fetch_delay(Duration::from_millis(30));
        let start = std::time::Instant::now();
        store.fetch_once("u1").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
