//! Replay scenario file format.
//!
//! ```json
//! {
//!   "documents": [
//!     { "subject": "u1", "latitude": 48.85, "longitude": 2.35,
//!       "timestamp": "2024-05-01T12:00:00Z" }
//!   ],
//!   "track": ["u1", "u2"],
//!   "steps": [
//!     { "after_ms": 100, "action": "put", "subject": "u2",
//!       "latitude": 45.75, "longitude": 4.83 },
//!     { "after_ms": 50, "action": "delete", "subject": "u1" },
//!     { "action": "untrack", "subject": "u2" }
//!   ],
//!   "settle_ms": 200
//! }
//! ```
//!
//! Documents without a timestamp are stamped at ingestion.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CliError;

const DEFAULT_SETTLE_MS: u64 = 100;

/// A location document written to the store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioDocument {
    pub subject: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Write (or overwrite) a subject's document.
    Put(ScenarioDocument),
    /// Delete a subject's document.
    Delete { subject: String },
    /// Track more subjects.
    Track { subjects: Vec<String> },
    /// Stop tracking one subject.
    Untrack { subject: String },
    /// Stop tracking everyone.
    UntrackAll,
}

/// One timed step; `after_ms` counts from the previous step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub after_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    /// Documents present before tracking starts.
    #[serde(default)]
    pub documents: Vec<ScenarioDocument>,
    /// Subjects tracked at start.
    #[serde(default)]
    pub track: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Wait after the last step before the final summary.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::ScenarioRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(text)?)
    }
}
