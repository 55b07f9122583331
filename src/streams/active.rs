//! Local cache of devices known to have a live stream.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Device id → expiry of its "already active" mark.
#[derive(Debug, Default)]
pub struct ActiveStreams {
    entries: DashMap<String, Instant>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_active(&self, device_id: &str, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.insert(device_id.to_string(), Instant::now() + ttl);
    }

    /// Forget a device. Returns whether it was cached.
    pub fn mark_inactive(&self, device_id: &str) -> bool {
        self.entries.remove(device_id).is_some()
    }

    /// Whether the device is cached and not expired. Expired entries are dropped.
    pub fn is_active(&self, device_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove_if(device_id, |_, expires_at| *expires_at <= now)
            .is_none()
            && self.entries.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
