//! GeoTrack - live location synchronization for followed users
//!
//! This library keeps the current position of a dynamic set of remote
//! subjects in sync with a document store: it bootstraps each subject with a
//! one-shot read, then streams live changes, deduplicating redundant
//! notifications and answering staleness and distance queries.
//!
//! # Modules
//!
//! - [`geo`]: Haversine distance and coordinate validation
//! - [`location`]: the immutable [`location::LocationRecord`]
//! - [`store`]: the consumed store interface and an in-memory adapter
//! - [`sync`]: the [`sync::SyncEngine`] and its event contract
//! - [`config`] / [`logging`]: configuration file and tracing setup

pub mod config;
pub mod geo;
pub mod location;
pub mod logging;
pub mod store;
pub mod sync;

pub use location::LocationRecord;
pub use sync::{EventSink, SyncEngine, SyncEvent};
