//! Latency classification.
//!
//! Bounds are inclusive: an elapsed time equal to a threshold lands in that
//! threshold's bucket.

use std::time::Duration;

use crate::config::SnapshotTiersConfig;
use crate::streams::types::ReadinessStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseThresholds {
    pub immediate: Duration,
    pub acceptable: Duration,
    pub slow: Duration,
}

impl ResponseThresholds {
    pub fn from_config(config: &SnapshotTiersConfig) -> Self {
        Self {
            immediate: Duration::from_millis(config.immediate_response_threshold_ms),
            acceptable: Duration::from_millis(config.acceptable_response_threshold_ms),
            slow: Duration::from_millis(config.slow_response_threshold_ms),
        }
    }

    /// Bucket a ready outcome by how long it took.
    pub fn classify(&self, elapsed: Duration) -> ReadinessStatus {
        if elapsed <= self.immediate {
            ReadinessStatus::Immediate
        } else if elapsed <= self.acceptable {
            ReadinessStatus::Acceptable
        } else if elapsed <= self.slow {
            ReadinessStatus::Slow
        } else {
            ReadinessStatus::TimedOut
        }
    }
}

impl Default for ResponseThresholds {
    fn default() -> Self {
        Self::from_config(&SnapshotTiersConfig::default())
    }
}
