//! Event payloads published on the bus.

use std::time::Duration;

use serde::Serialize;

use crate::resilience::CircuitState;
use crate::streams::types::{Purpose, Tier};

/// "Still working" update emitted while a device waits in Tier 2 or 3.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub device_id: String,
    pub purpose: Purpose,
    pub tier: Tier,
    #[serde(with = "crate::streams::types::duration_ms")]
    pub elapsed: Duration,
    /// Zero-based poll tick within the tier.
    pub tick: u32,
}

/// Everything the service announces to interested subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    Progress(ProgressEvent),
    CircuitTransition { from: CircuitState, to: CircuitState },
    ConfigReloaded { generation: u64, source: String },
}

impl ServiceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceEvent::Progress(_) => "progress",
            ServiceEvent::CircuitTransition { .. } => "circuit_transition",
            ServiceEvent::ConfigReloaded { .. } => "config_reloaded",
        }
    }
}
