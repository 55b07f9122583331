//! Atomically swappable configuration snapshot.
//!
//! Subsystems hold a cloned [`LiveConfig`] and call [`LiveConfig::load`] at
//! the start of each operation; a reload replaces the whole snapshot, so an
//! operation already running keeps the snapshot it started with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::ServiceConfig;

#[derive(Clone)]
pub struct LiveConfig {
    current: Arc<ArcSwap<ServiceConfig>>,
    generation: Arc<AtomicU64>,
}

impl LiveConfig {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<ServiceConfig> {
        self.current.load_full()
    }

    /// Replace the snapshot; returns the new generation number.
    pub fn store(&self, config: ServiceConfig) -> u64 {
        self.current.store(Arc::new(config));
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of swaps since startup.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("generation", &self.generation())
            .finish()
    }
}
