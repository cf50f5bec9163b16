//! Retention policy for spill files left behind by earlier processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for sweeping stale spill files.
///
/// Namespaces locked by a live [`SpillDirectory`](crate::SpillDirectory) are
/// never swept; the policy only applies to namespaces whose owner is gone,
/// e.g. after a crash, and to loose files under the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// How long an unowned file is kept before it is eligible for removal
    pub retention_duration: Duration,
    /// Whether sweeping is enabled
    pub enabled: bool,
}

impl RetentionPolicy {
    /// Create a new retention policy with default settings.
    ///
    /// Default: unowned files older than 1 hour are removed.
    pub fn new() -> Self {
        Self {
            retention_duration: Duration::from_secs(60 * 60),
            enabled: true,
        }
    }

    /// Set the retention duration.
    pub fn remove_after(mut self, duration: Duration) -> Self {
        self.retention_duration = duration;
        self
    }

    /// Enable or disable sweeping.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Disable sweeping entirely.
    pub fn disabled() -> Self {
        Self {
            retention_duration: Duration::ZERO,
            enabled: false,
        }
    }

    /// Check whether a file last modified at `modified` is stale at `now`.
    pub fn is_stale(&self, modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        let retention = chrono::Duration::from_std(self.retention_duration).unwrap_or_default();
        modified + retention <= now
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new()
    }
}
