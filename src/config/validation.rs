//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, jitter bounds ordered)
//! - Check cross-field constraints (threshold ordering, port conflicts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mtx = &config.mediamtx;
    if mtx.host.trim().is_empty() {
        errors.push(ValidationError::new("mediamtx.host", "must not be empty"));
    }
    if mtx.api_port == 0 {
        errors.push(ValidationError::new("mediamtx.api_port", "must be non-zero"));
    }
    if mtx.hls_port == 0 {
        errors.push(ValidationError::new("mediamtx.hls_port", "must be non-zero"));
    }
    if mtx.api_port != 0 && mtx.api_port == mtx.hls_port {
        errors.push(ValidationError::new(
            "mediamtx.hls_port",
            format!("conflicts with api_port {}", mtx.api_port),
        ));
    }

    positive(&mut errors, "mediamtx.health_check_interval_secs", mtx.health_check_interval_secs);
    positive(&mut errors, "mediamtx.health_probe_timeout_ms", mtx.health_probe_timeout_ms);
    positive(&mut errors, "mediamtx.health_failure_threshold", mtx.health_failure_threshold as u64);
    positive(
        &mut errors,
        "mediamtx.health_circuit_breaker_timeout_secs",
        mtx.health_circuit_breaker_timeout_secs,
    );
    positive(&mut errors, "mediamtx.health_max_backoff_interval_secs", mtx.health_max_backoff_interval_secs);
    positive(
        &mut errors,
        "mediamtx.health_recovery_confirmation_threshold",
        mtx.health_recovery_confirmation_threshold as u64,
    );
    positive(&mut errors, "mediamtx.process_termination_timeout_secs", mtx.process_termination_timeout_secs);
    positive(&mut errors, "mediamtx.process_kill_timeout_secs", mtx.process_kill_timeout_secs);

    if !(mtx.backoff_base_multiplier.is_finite() && mtx.backoff_base_multiplier > 0.0) {
        errors.push(ValidationError::new(
            "mediamtx.backoff_base_multiplier",
            format!("must be > 0, got {}", mtx.backoff_base_multiplier),
        ));
    }

    let [jitter_min, jitter_max] = mtx.backoff_jitter_range;
    if !(jitter_min.is_finite() && jitter_max.is_finite() && jitter_min > 0.0 && jitter_max > 0.0) {
        errors.push(ValidationError::new(
            "mediamtx.backoff_jitter_range",
            format!("bounds must be > 0, got [{jitter_min}, {jitter_max}]"),
        ));
    } else if jitter_min >= jitter_max {
        errors.push(ValidationError::new(
            "mediamtx.backoff_jitter_range",
            format!("min must be < max, got [{jitter_min}, {jitter_max}]"),
        ));
    }

    let sr = &mtx.stream_readiness;
    positive(&mut errors, "mediamtx.stream_readiness.timeout_ms", sr.timeout_ms);
    positive(&mut errors, "mediamtx.stream_readiness.retry_delay_ms", sr.retry_delay_ms);
    positive(&mut errors, "mediamtx.stream_readiness.check_interval_ms", sr.check_interval_ms);

    let tiers = &config.performance.snapshot_tiers;
    positive(&mut errors, "performance.snapshot_tiers.tier1_usb_direct_timeout_ms", tiers.tier1_usb_direct_timeout_ms);
    positive(
        &mut errors,
        "performance.snapshot_tiers.tier2_rtsp_ready_check_timeout_ms",
        tiers.tier2_rtsp_ready_check_timeout_ms,
    );
    positive(&mut errors, "performance.snapshot_tiers.tier3_activation_timeout_ms", tiers.tier3_activation_timeout_ms);
    positive(
        &mut errors,
        "performance.snapshot_tiers.tier3_activation_trigger_timeout_ms",
        tiers.tier3_activation_trigger_timeout_ms,
    );
    positive(&mut errors, "performance.snapshot_tiers.total_operation_timeout_ms", tiers.total_operation_timeout_ms);

    if tiers.tier3_activation_trigger_timeout_ms > tiers.tier3_activation_timeout_ms {
        errors.push(ValidationError::new(
            "performance.snapshot_tiers.tier3_activation_trigger_timeout_ms",
            "must not exceed tier3_activation_timeout_ms",
        ));
    }

    if tiers.immediate_response_threshold_ms > tiers.acceptable_response_threshold_ms
        || tiers.acceptable_response_threshold_ms > tiers.slow_response_threshold_ms
    {
        errors.push(ValidationError::new(
            "performance.snapshot_tiers",
            format!(
                "response thresholds must satisfy immediate <= acceptable <= slow, got {} / {} / {}",
                tiers.immediate_response_threshold_ms,
                tiers.acceptable_response_threshold_ms,
                tiers.slow_response_threshold_ms
            ),
        ));
    }

    if config.events.channel_capacity == 0 {
        errors.push(ValidationError::new("events.channel_capacity", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {}", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("not a socket address: {}", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if config.watch.enabled {
        positive(&mut errors, "watch.poll_interval_ms", config.watch.poll_interval_ms);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be > 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_inverted_jitter_rejected() {
        let mut config = ServiceConfig::default();
        config.mediamtx.backoff_jitter_range = [1.2, 0.8];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "mediamtx.backoff_jitter_range");
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let mut config = ServiceConfig::default();
        config.performance.snapshot_tiers.acceptable_response_threshold_ms = 6000;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "performance.snapshot_tiers"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.mediamtx.health_failure_threshold = 0;
        config.mediamtx.backoff_base_multiplier = 0.0;
        config.mediamtx.hls_port = config.mediamtx.api_port;
        config.performance.snapshot_tiers.tier3_activation_trigger_timeout_ms = 5000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"mediamtx.health_failure_threshold"));
        assert!(fields.contains(&"mediamtx.backoff_base_multiplier"));
        assert!(fields.contains(&"mediamtx.hls_port"));
        assert!(fields.contains(&"performance.snapshot_tiers.tier3_activation_trigger_timeout_ms"));
    }
}
