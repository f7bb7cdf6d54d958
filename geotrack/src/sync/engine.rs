//! Live multi-subject location synchronization.
//!
//! # Lifecycle per subject
//!
//! ```text
//! Untracked ──track──► Bootstrapping ──batch complete──► Streaming
//!     ▲                     │                               │
//!     └──────untrack────────┴───────────untrack─────────────┘
//! ```
//!
//! A `track` call bootstraps its subjects with one-shot fetches (bounded
//! concurrency, no ordering between subjects), emits one
//! `on_batch_bootstrapped`, and only then opens one live subscription per
//! subject. Live notifications are deduplicated against the
//! current-location table before being fanned out.
//!
//! # Locking
//!
//! All table state sits behind one `parking_lot::Mutex`. Bootstrap
//! completions and subscription callbacks mutate under the lock, collect the
//! resulting event, release the lock and only then call the sink. Sinks may
//! therefore call back into the engine.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::config::EngineConfig;
use super::events::{dispatch, EventSink, SyncEvent};
use super::handle::SubscriptionHandle;
use crate::geo::{distance_meters, GeoBounds};
use crate::location::LocationRecord;
use crate::store::{DocumentSnapshot, LocationStore, SnapshotCallback, StoreError};

/// Result of one `track` call's bootstrap phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Engine-unique batch identifier.
    pub batch_id: u64,
    /// Subjects for which an initial record was loaded.
    pub success_count: usize,
    /// Subjects bootstrapped by this call.
    pub total_count: usize,
}

/// Where a subject currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectPhase {
    /// Neither bootstrapping nor subscribed.
    Untracked,
    /// One-shot fetch issued; live subscription not yet open.
    Bootstrapping,
    /// Live subscription registered.
    Streaming,
}

/// Staleness classification of a cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Observed within the configured freshness window.
    Fresh,
    /// Observed longer ago than the freshness window.
    Stale,
}

/// Outcome of offering a record to the current-location table.
#[derive(Debug, PartialEq)]
enum Merge {
    Accepted(LocationRecord),
    Duplicate,
    Older,
}

/// Tables guarded by the engine lock.
#[derive(Default)]
struct EngineState {
    /// Most recent accepted record per subject.
    locations: HashMap<String, LocationRecord>,
    /// Active live subscription per subject.
    subscriptions: HashMap<String, SubscriptionHandle>,
    /// Subjects with a bootstrap in flight, mapped to the owning batch.
    bootstrapping: HashMap<String, u64>,
}

impl EngineState {
    fn merge(&mut self, record: LocationRecord, reject_older: bool) -> Merge {
        if let Some(current) = self.locations.get(record.subject_id()) {
            if current.is_same_observation(&record) {
                return Merge::Duplicate;
            }
            if reject_older && record.observed_at() < current.observed_at() {
                return Merge::Older;
            }
        }
        self.locations
            .insert(record.subject_id().to_string(), record.clone());
        Merge::Accepted(record)
    }

    fn owns_bootstrap(&self, subject_id: &str, batch_id: u64) -> bool {
        self.bootstrapping.get(subject_id) == Some(&batch_id)
    }
}

struct Shared {
    store: Arc<dyn LocationStore>,
    config: EngineConfig,
    runtime: Handle,
    state: Mutex<EngineState>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    next_batch_id: AtomicU64,
}

/// Tracks the current location of a dynamic set of subjects.
///
/// Cheap to clone; clones share the same tables. `track` returns
/// immediately and reports progress through the [`EventSink`]; the other
/// operations take effect before they return.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use geotrack::store::MemoryLocationStore;
/// use geotrack::sync::{ChannelEventSink, SyncEngine};
///
/// let store = Arc::new(MemoryLocationStore::new());
/// let engine = SyncEngine::new(store, tokio::runtime::Handle::current());
///
/// let (sink, mut events) = ChannelEventSink::new();
/// engine.set_event_sink(Some(Arc::new(sink)));
///
/// engine.track(["u1", "u2"]);
/// while let Some(event) = events.recv().await {
///     println!("{}", event);
/// }
/// ```
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SyncEngine")
            .field("locations", &state.locations.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("bootstrapping", &state.bootstrapping.len())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl SyncEngine {
    /// Create an engine with default configuration.
    ///
    /// Bootstrap batches and store subscriptions run on `runtime`.
    pub fn new(store: Arc<dyn LocationStore>, runtime: Handle) -> Self {
        Self::with_config(store, runtime, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(store: Arc<dyn LocationStore>, runtime: Handle, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                runtime,
                state: Mutex::new(EngineState::default()),
                sink: RwLock::new(None),
                next_batch_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Replace the notification target. `None` silences the engine without
    /// stopping any subscription.
    pub fn set_event_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        *self.shared.sink.write() = sink;
    }

    /// Start tracking the given subjects, in addition to those already
    /// tracked.
    ///
    /// Blank ids are ignored, as are subjects already subscribed or already
    /// bootstrapping. Returns `None` when nothing is left to do; otherwise
    /// the handle of the background batch, which callers may ignore.
    pub fn track<I, S>(&self, subject_ids: I) -> Option<JoinHandle<BatchSummary>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: BTreeSet<String> = subject_ids
            .into_iter()
            .map(Into::into)
            .filter(|id| {
                let valid = !id.trim().is_empty();
                if !valid {
                    warn!("Ignoring blank subject id");
                }
                valid
            })
            .collect();

        if requested.is_empty() {
            debug!("No subject ids provided for tracking");
            return None;
        }

        let batch_id = self.shared.next_batch_id.fetch_add(1, Ordering::Relaxed);
        let subjects: Vec<String> = {
            let mut state = self.shared.state.lock();
            let fresh: Vec<String> = requested
                .into_iter()
                .filter(|id| {
                    if state.subscriptions.contains_key(id) {
                        debug!(subject_id = %id, "Already subscribed");
                        false
                    } else if state.bootstrapping.contains_key(id) {
                        debug!(subject_id = %id, "Bootstrap already in flight");
                        false
                    } else {
                        true
                    }
                })
                .collect();
            for id in &fresh {
                state.bootstrapping.insert(id.clone(), batch_id);
            }
            fresh
        };

        if subjects.is_empty() {
            debug!(batch_id, "All requested subjects already tracked");
            return None;
        }

        info!(batch_id, subjects = subjects.len(), "Starting location bootstrap");
        let shared = Arc::clone(&self.shared);
        Some(
            self.shared
                .runtime
                .spawn(async move { shared.run_batch(batch_id, subjects).await }),
        )
    }

    /// Start tracking one more subject. Same ordering as [`Self::track`].
    pub fn track_single(&self, subject_id: &str) -> Option<JoinHandle<BatchSummary>> {
        self.track([subject_id])
    }

    /// Stop tracking a subject: cancel its subscription, drop its record and
    /// abandon any bootstrap in flight. No event is emitted; unknown
    /// subjects are ignored.
    pub fn untrack(&self, subject_id: &str) {
        let (handle, record, bootstrapping) = {
            let mut state = self.shared.state.lock();
            (
                state.subscriptions.remove(subject_id),
                state.locations.remove(subject_id),
                state.bootstrapping.remove(subject_id),
            )
        };

        if handle.is_none() && record.is_none() && bootstrapping.is_none() {
            debug!(subject_id, "Untrack ignored: subject not tracked");
            return;
        }

        if let Some(handle) = &handle {
            handle.cancel();
        }
        debug!(
            subject_id,
            had_subscription = handle.is_some(),
            had_record = record.is_some(),
            "Stopped tracking subject"
        );
    }

    /// Cancel every subscription and clear all tables.
    pub fn untrack_all(&self) {
        let (handles, records, bootstrapping) = {
            let mut state = self.shared.state.lock();
            let handles = std::mem::take(&mut state.subscriptions);
            let records = state.locations.len();
            let bootstrapping = state.bootstrapping.len();
            state.locations.clear();
            state.bootstrapping.clear();
            (handles, records, bootstrapping)
        };

        for handle in handles.values() {
            handle.cancel();
        }
        info!(
            subscriptions = handles.len(),
            records, bootstrapping, "Stopped all location tracking"
        );
    }

    /// Tear down all tracking and detach the event sink.
    pub fn shutdown(&self) {
        self.untrack_all();
        self.set_event_sink(None);
    }

    /// Most recent accepted record for the subject.
    pub fn current_location(&self, subject_id: &str) -> Option<LocationRecord> {
        self.shared.state.lock().locations.get(subject_id).cloned()
    }

    /// Copy of the whole current-location table.
    pub fn all_current_locations(&self) -> HashMap<String, LocationRecord> {
        self.shared.state.lock().locations.clone()
    }

    /// True if a record is cached or a live subscription is active.
    pub fn is_tracking(&self, subject_id: &str) -> bool {
        let state = self.shared.state.lock();
        state.locations.contains_key(subject_id) || state.subscriptions.contains_key(subject_id)
    }

    /// True only if a live subscription is registered for the subject.
    pub fn has_active_subscription(&self, subject_id: &str) -> bool {
        self.shared
            .state
            .lock()
            .subscriptions
            .contains_key(subject_id)
    }

    /// Lifecycle phase of the subject.
    pub fn phase(&self, subject_id: &str) -> SubjectPhase {
        let state = self.shared.state.lock();
        if state.subscriptions.contains_key(subject_id) {
            SubjectPhase::Streaming
        } else if state.bootstrapping.contains_key(subject_id) {
            SubjectPhase::Bootstrapping
        } else {
            SubjectPhase::Untracked
        }
    }

    /// Observation time of the subject's cached record.
    pub fn last_update_time(&self, subject_id: &str) -> Option<DateTime<Utc>> {
        self.shared
            .state
            .lock()
            .locations
            .get(subject_id)
            .map(LocationRecord::observed_at)
    }

    /// Whether the cached record was observed no more than `within` ago.
    pub fn is_recent(&self, subject_id: &str, within: Duration) -> bool {
        self.is_recent_at(subject_id, within, Utc::now())
    }

    /// [`Self::is_recent`] evaluated against an explicit `now`.
    pub fn is_recent_at(&self, subject_id: &str, within: Duration, now: DateTime<Utc>) -> bool {
        let Some(observed_at) = self.last_update_time(subject_id) else {
            return false;
        };
        match chrono::Duration::from_std(within) {
            Ok(within) => now - observed_at <= within,
            // Window too large to represent: everything is recent
            Err(_) => true,
        }
    }

    /// Fresh/Stale classification using the configured freshness window.
    pub fn freshness(&self, subject_id: &str) -> Option<Freshness> {
        self.last_update_time(subject_id)?;
        if self.is_recent(subject_id, self.shared.config.freshness_window) {
            Some(Freshness::Fresh)
        } else {
            Some(Freshness::Stale)
        }
    }

    /// Great-circle distance in meters between two subjects' cached records.
    pub fn distance_between(&self, subject_a: &str, subject_b: &str) -> Option<f64> {
        let state = self.shared.state.lock();
        let a = state.locations.get(subject_a)?;
        let b = state.locations.get(subject_b)?;
        Some(distance_meters(
            a.latitude(),
            a.longitude(),
            b.latitude(),
            b.longitude(),
        ))
    }

    /// Bounding box of every cached record.
    pub fn current_bounds(&self) -> Option<GeoBounds> {
        let state = self.shared.state.lock();
        GeoBounds::from_points(state.locations.values().map(LocationRecord::position))
    }

    pub fn active_subscription_count(&self) -> usize {
        self.shared.state.lock().subscriptions.len()
    }

    /// Number of subjects with a cached record.
    pub fn tracked_subject_count(&self) -> usize {
        self.shared.state.lock().locations.len()
    }

    /// Subjects with a cached record.
    pub fn tracked_subject_ids(&self) -> BTreeSet<String> {
        self.shared.state.lock().locations.keys().cloned().collect()
    }
}

impl Shared {
    async fn run_batch(self: Arc<Self>, batch_id: u64, subjects: Vec<String>) -> BatchSummary {
        let total_count = subjects.len();
        let concurrency = self.config.max_concurrent_fetches.max(1);

        let success_count = stream::iter(subjects.clone())
            .map(|subject_id| {
                let shared = Arc::clone(&self);
                async move { shared.bootstrap_subject(batch_id, &subject_id).await }
            })
            .buffer_unordered(concurrency)
            .filter(|loaded| futures::future::ready(*loaded))
            .count()
            .await;

        info!(
            batch_id,
            success_count, total_count, "Initial locations loaded"
        );
        self.emit(&SyncEvent::BatchBootstrapped {
            success_count,
            total_count,
        });

        for subject_id in &subjects {
            self.open_subscription(batch_id, subject_id);
        }

        BatchSummary {
            batch_id,
            success_count,
            total_count,
        }
    }

    /// Fetch and merge one subject's initial record.
    ///
    /// Returns whether a usable record was loaded.
    async fn bootstrap_subject(&self, batch_id: u64, subject_id: &str) -> bool {
        let result = self.store.fetch_once(subject_id).await;
        let ingested_at = Utc::now();

        let (loaded, event) = {
            let mut state = self.state.lock();
            if !state.owns_bootstrap(subject_id, batch_id) {
                debug!(subject_id, batch_id, "Discarding bootstrap result for untracked subject");
                return false;
            }
            self.apply_bootstrap(&mut state, subject_id, result, ingested_at)
        };

        if let Some(event) = event {
            self.emit(&event);
        }
        loaded
    }

    fn apply_bootstrap(
        &self,
        state: &mut EngineState,
        subject_id: &str,
        result: Result<DocumentSnapshot, StoreError>,
        ingested_at: DateTime<Utc>,
    ) -> (bool, Option<SyncEvent>) {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(subject_id, error = %error, "Initial location fetch failed");
                return (
                    false,
                    Some(SyncEvent::Error {
                        subject_id: subject_id.to_string(),
                        message: error.to_string(),
                    }),
                );
            }
        };

        if !snapshot.exists() {
            debug!(subject_id, "No current location document");
            return (false, None);
        }

        let record = match LocationRecord::from_snapshot(subject_id, &snapshot, ingested_at) {
            Ok(record) => record,
            Err(error) => {
                debug!(subject_id, error = %error, "Initial location document unusable");
                return (false, None);
            }
        };

        match state.merge(record, self.config.reject_older_observations) {
            Merge::Accepted(record) => {
                debug!(
                    subject_id,
                    latitude = record.latitude(),
                    longitude = record.longitude(),
                    "Initial location loaded"
                );
                (
                    true,
                    Some(SyncEvent::Updated {
                        subject_id: subject_id.to_string(),
                        record,
                    }),
                )
            }
            Merge::Duplicate | Merge::Older => (true, None),
        }
    }

    /// Register a handle for the subject and open its live subscription.
    fn open_subscription(self: &Arc<Self>, batch_id: u64, subject_id: &str) {
        let (handle_id, token) = {
            let mut state = self.state.lock();
            if !state.owns_bootstrap(subject_id, batch_id) {
                debug!(subject_id, batch_id, "Subject untracked before streaming; not subscribing");
                return;
            }
            state.bootstrapping.remove(subject_id);

            if state.subscriptions.contains_key(subject_id) {
                warn!(subject_id, "Subscription already registered; not opening another");
                return;
            }

            let handle = SubscriptionHandle::new(subject_id);
            let registration = (handle.id(), handle.token());
            state.subscriptions.insert(subject_id.to_string(), handle);
            registration
        };

        let weak: Weak<Shared> = Arc::downgrade(self);
        let subject = subject_id.to_string();
        let callback: SnapshotCallback =
            Arc::new(move |notification: Result<DocumentSnapshot, StoreError>| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_live_event(&subject, handle_id, notification);
                }
            });

        // Outside the lock: the store may deliver the first notification
        // synchronously.
        self.store.subscribe(subject_id, token, callback);
        debug!(subject_id, handle_id, "Started location listener");
    }

    fn on_live_event(
        &self,
        subject_id: &str,
        handle_id: u64,
        notification: Result<DocumentSnapshot, StoreError>,
    ) {
        let ingested_at = Utc::now();

        let event = {
            let mut state = self.state.lock();
            match state.subscriptions.get(subject_id) {
                Some(handle) if handle.id() == handle_id => {}
                _ => {
                    trace!(subject_id, handle_id, "Dropping notification from revoked subscription");
                    return;
                }
            }
            self.apply_live(&mut state, subject_id, notification, ingested_at)
        };

        if let Some(event) = event {
            self.emit(&event);
        }
    }

    fn apply_live(
        &self,
        state: &mut EngineState,
        subject_id: &str,
        notification: Result<DocumentSnapshot, StoreError>,
        ingested_at: DateTime<Utc>,
    ) -> Option<SyncEvent> {
        let snapshot = match notification {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(subject_id, error = %error, "Error listening to location");
                return Some(SyncEvent::Error {
                    subject_id: subject_id.to_string(),
                    message: error.to_string(),
                });
            }
        };

        if !snapshot.exists() {
            let had_record = state.locations.remove(subject_id).is_some();
            debug!(subject_id, had_record, "Location document no longer exists");
            return Some(SyncEvent::Removed {
                subject_id: subject_id.to_string(),
            });
        }

        let record = match LocationRecord::from_snapshot(subject_id, &snapshot, ingested_at) {
            Ok(record) => record,
            Err(error) => {
                warn!(subject_id, error = %error, "Error parsing location data");
                return Some(SyncEvent::Error {
                    subject_id: subject_id.to_string(),
                    message: format!("Error parsing location data: {}", error),
                });
            }
        };

        match state.merge(record, self.config.reject_older_observations) {
            Merge::Accepted(record) => {
                debug!(
                    subject_id,
                    latitude = record.latitude(),
                    longitude = record.longitude(),
                    "Location updated"
                );
                Some(SyncEvent::Updated {
                    subject_id: subject_id.to_string(),
                    record,
                })
            }
            Merge::Duplicate => {
                trace!(subject_id, "Duplicate location suppressed");
                None
            }
            Merge::Older => {
                debug!(subject_id, "Older observation suppressed");
                None
            }
        }
    }

    fn emit(&self, event: &SyncEvent) {
        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            dispatch(sink.as_ref(), event);
        }
    }
}
