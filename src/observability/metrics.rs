//! Metrics collection and exposition.
//!
//! # Metrics
//! - `camera_readiness_total` (counter): readiness outcomes by status, tier
//! - `camera_readiness_duration_seconds` (histogram): time to a readiness outcome
//! - `camera_activation_triggers_total` (counter): activation trigger attempts
//! - `camera_inflight_activations` (gauge): devices with an activation running
//! - `mediamtx_probe_total` (counter): health probes by outcome
//! - `mediamtx_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `event_subscriber_panics_total` (counter): recovered handler panics
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitState;
use crate::streams::types::{ReadinessStatus, Tier};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_readiness(status: ReadinessStatus, tier: Tier, elapsed: Duration) {
    counter!("camera_readiness_total", "status" => status.as_str(), "tier" => tier.label()).increment(1);
    histogram!("camera_readiness_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_trigger() {
    counter!("camera_activation_triggers_total").increment(1);
}

pub fn record_inflight(count: usize) {
    gauge!("camera_inflight_activations").set(count as f64);
}

pub fn record_probe(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("mediamtx_probe_total", "outcome" => outcome).increment(1);
}

pub fn record_circuit_state(state: CircuitState) {
    gauge!("mediamtx_circuit_state").set(state.as_gauge());
}

pub fn record_subscriber_panic(subscriber: &'static str) {
    counter!("event_subscriber_panics_total", "subscriber" => subscriber).increment(1);
}
