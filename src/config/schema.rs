//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so a minimal (or empty) file is valid.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration for the camera service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// MediaMTX connection, health monitoring and stream readiness.
    pub mediamtx: MediaMtxConfig,

    /// Response-time budgets.
    pub performance: PerformanceConfig,

    /// Event bus settings.
    pub events: EventsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Config hot-reload settings.
    pub watch: WatchConfig,
}

/// MediaMTX media server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MediaMtxConfig {
    /// Host running MediaMTX.
    pub host: String,

    /// Control API port.
    pub api_port: u16,

    /// HLS muxer port (reading a path here starts on-demand sources).
    pub hls_port: u16,

    /// Interval between health probes while the circuit is not open.
    pub health_check_interval_secs: u64,

    /// Timeout for a single health probe.
    pub health_probe_timeout_ms: u64,

    /// Consecutive probe failures that open the circuit.
    pub health_failure_threshold: u32,

    /// Minimum time the circuit stays open before a trial probe.
    pub health_circuit_breaker_timeout_secs: u64,

    /// Ceiling for backoff-derived delays.
    pub health_max_backoff_interval_secs: u64,

    /// Consecutive half-open successes required to close the circuit.
    pub health_recovery_confirmation_threshold: u32,

    /// Exponential backoff multiplier.
    pub backoff_base_multiplier: f64,

    /// Jitter factor range `[min, max]` applied to backoff delays.
    pub backoff_jitter_range: [f64; 2],

    /// Grace period for the media server process to exit after SIGTERM.
    pub process_termination_timeout_secs: u64,

    /// Grace period after SIGKILL.
    pub process_kill_timeout_secs: u64,

    /// On-demand stream readiness.
    pub stream_readiness: StreamReadinessConfig,
}

impl Default for MediaMtxConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            api_port: 9997,
            hls_port: 8888,
            health_check_interval_secs: 30,
            health_probe_timeout_ms: 2000,
            health_failure_threshold: 10,
            health_circuit_breaker_timeout_secs: 60,
            health_max_backoff_interval_secs: 120,
            health_recovery_confirmation_threshold: 3,
            backoff_base_multiplier: 2.0,
            backoff_jitter_range: [0.8, 1.2],
            process_termination_timeout_secs: 3,
            process_kill_timeout_secs: 2,
            stream_readiness: StreamReadinessConfig::default(),
        }
    }
}

impl MediaMtxConfig {
    pub fn api_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.api_port)
    }

    pub fn hls_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.hls_port)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn health_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health_probe_timeout_ms)
    }

    pub fn health_circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.health_circuit_breaker_timeout_secs)
    }

    pub fn health_max_backoff_interval(&self) -> Duration {
        Duration::from_secs(self.health_max_backoff_interval_secs)
    }

    pub fn process_termination_timeout(&self) -> Duration {
        Duration::from_secs(self.process_termination_timeout_secs)
    }

    pub fn process_kill_timeout(&self) -> Duration {
        Duration::from_secs(self.process_kill_timeout_secs)
    }
}

/// Stream readiness parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StreamReadinessConfig {
    /// Overall budget for recording requests.
    pub timeout_ms: u64,

    /// Retries for a transiently failing trigger or poll.
    pub retry_attempts: u32,

    /// Base delay between retries.
    pub retry_delay_ms: u64,

    /// Readiness polling interval.
    pub check_interval_ms: u64,

    /// Publish progress events while waiting.
    pub enable_progress_notifications: bool,

    /// Return a `TimedOut` result instead of an error when the budget runs out.
    pub graceful_fallback: bool,

    /// How long a device stays in the local "already active" cache.
    pub active_stream_ttl_secs: u64,

    /// Cancel an activation once every caller waiting on it has gone away.
    pub cancel_unobserved_activations: bool,
}

impl Default for StreamReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            check_interval_ms: 500,
            enable_progress_notifications: true,
            graceful_fallback: true,
            active_stream_ttl_secs: 30,
            cancel_unobserved_activations: true,
        }
    }
}

impl StreamReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn active_stream_ttl(&self) -> Duration {
        Duration::from_secs(self.active_stream_ttl_secs)
    }
}

/// Performance budgets.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    pub snapshot_tiers: SnapshotTiersConfig,
}

/// Per-tier timeouts and response-time classification thresholds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SnapshotTiersConfig {
    /// Tier 1: directly usable capture path.
    pub tier1_usb_direct_timeout_ms: u64,

    /// Tier 2: passive readiness check against the media server.
    pub tier2_rtsp_ready_check_timeout_ms: u64,

    /// Tier 3: on-demand activation, trigger plus readiness polling.
    pub tier3_activation_timeout_ms: u64,

    /// Tier 3: acknowledgement of the activation trigger itself.
    pub tier3_activation_trigger_timeout_ms: u64,

    /// Overall budget for snapshot requests.
    pub total_operation_timeout_ms: u64,

    pub immediate_response_threshold_ms: u64,
    pub acceptable_response_threshold_ms: u64,
    pub slow_response_threshold_ms: u64,
}

impl Default for SnapshotTiersConfig {
    fn default() -> Self {
        Self {
            tier1_usb_direct_timeout_ms: 200,
            tier2_rtsp_ready_check_timeout_ms: 1000,
            tier3_activation_timeout_ms: 3000,
            tier3_activation_trigger_timeout_ms: 1000,
            total_operation_timeout_ms: 10_000,
            immediate_response_threshold_ms: 500,
            acceptable_response_threshold_ms: 2000,
            slow_response_threshold_ms: 5000,
        }
    }
}

impl SnapshotTiersConfig {
    pub fn tier1_timeout(&self) -> Duration {
        Duration::from_millis(self.tier1_usb_direct_timeout_ms)
    }

    pub fn tier2_timeout(&self) -> Duration {
        Duration::from_millis(self.tier2_rtsp_ready_check_timeout_ms)
    }

    pub fn tier3_timeout(&self) -> Duration {
        Duration::from_millis(self.tier3_activation_timeout_ms)
    }

    pub fn trigger_timeout(&self) -> Duration {
        Duration::from_millis(self.tier3_activation_trigger_timeout_ms)
    }

    pub fn total_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.total_operation_timeout_ms)
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Bounded channel capacity; events beyond it are dropped.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { channel_capacity: 256 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,

    /// Pretty for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// How config file changes are detected.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// OS file events.
    #[default]
    Notify,
    /// Periodic modification-time checks.
    Poll,
}

/// Config hot-reload configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub mode: WatchMode,
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: WatchMode::Notify,
            poll_interval_ms: 2000,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
