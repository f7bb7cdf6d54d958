//! Synchronization engine.
//!
//! [`SyncEngine`] owns the current-location and subscription tables,
//! bootstraps subjects with one-shot fetches before streaming their live
//! updates, deduplicates notifications and answers staleness and distance
//! queries. Observers receive notifications through an [`EventSink`].

mod config;
mod engine;
mod events;
mod handle;

pub use config::{EngineConfig, DEFAULT_FRESHNESS_WINDOW, DEFAULT_MAX_CONCURRENT_FETCHES};
pub use engine::{BatchSummary, Freshness, SubjectPhase, SyncEngine};
pub use events::{ChannelEventSink, EventSink, SyncEvent};
pub use handle::SubscriptionHandle;
