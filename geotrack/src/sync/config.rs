//! Engine configuration.

use std::time::Duration;

/// Default window within which a record counts as fresh (15 minutes).
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default cap on concurrent bootstrap fetches within one batch.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// Configuration for [`super::SyncEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records observed within this window are [`super::Freshness::Fresh`].
    pub freshness_window: Duration,

    /// Maximum bootstrap fetches in flight for a single `track` call.
    pub max_concurrent_fetches: usize,

    /// Suppress records whose `observed_at` is older than the cached one.
    pub reject_older_observations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            reject_older_observations: true,
        }
    }
}

impl EngineConfig {
    /// Set the freshness window.
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set the bootstrap fetch concurrency. Zero is treated as one.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// Enable or disable rejection of older observations.
    pub fn with_reject_older_observations(mut self, reject: bool) -> Self {
        self.reject_older_observations = reject;
        self
    }
}
