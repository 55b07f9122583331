//! Health status snapshot exposed to callers.
//!
//! # States
//! - healthy: circuit Closed, requests may escalate to activation
//! - unhealthy: circuit Open or HalfOpen
//!
//! Counters are cumulative since the monitor was created.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::resilience::{CircuitSnapshot, CircuitState};

/// Probe bookkeeping kept by the monitor.
#[derive(Debug, Clone, Default)]
pub struct ProbeStats {
    pub total: u64,
    pub failed: u64,
    pub last_probe_at: Option<SystemTime>,
    pub last_probe_succeeded: Option<bool>,
}

impl ProbeStats {
    pub fn record(&mut self, success: bool) {
        self.total += 1;
        if !success {
            self.failed += 1;
        }
        self.last_probe_at = Some(SystemTime::now());
        self.last_probe_succeeded = Some(success);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub recovery_successes: u32,
    pub backoff_attempt: u32,
    pub total_probes: u64,
    pub failed_probes: u64,
    /// Unix time in milliseconds.
    pub last_probe_at: Option<u64>,
    pub last_probe_succeeded: Option<bool>,
    /// Time left before the next trial probe while open.
    pub retry_after_ms: Option<u64>,
}

impl HealthStatus {
    pub fn build(circuit: &CircuitSnapshot, stats: &ProbeStats, retry_after: Option<Duration>) -> Self {
        Self {
            healthy: circuit.state == CircuitState::Closed,
            circuit_state: circuit.state,
            consecutive_failures: circuit.consecutive_failures,
            recovery_successes: circuit.recovery_successes,
            backoff_attempt: circuit.backoff_attempt,
            total_probes: stats.total,
            failed_probes: stats.failed,
            last_probe_at: stats
                .last_probe_at
                .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64),
            last_probe_succeeded: stats.last_probe_succeeded,
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
        }
    }
}
