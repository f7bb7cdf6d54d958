//! Location store abstraction.
//!
//! The engine consumes a [`LocationStore`]: a one-shot fetch and a live
//! subscription per subject. [`MemoryLocationStore`] is an in-process
//! implementation for tests and local replay.

mod memory;
mod traits;

pub use memory::MemoryLocationStore;
pub use traits::{
    BoxFuture, DocumentSnapshot, FieldError, LocationStore, SnapshotCallback, StoreError,
    FIELD_LATITUDE, FIELD_LONGITUDE, FIELD_TIMESTAMP,
};
