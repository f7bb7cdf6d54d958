//! Location model: one immutable record per observed position.

mod record;

pub use record::{LocationRecord, RecordError};
