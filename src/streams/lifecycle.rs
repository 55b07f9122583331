//! Interface to whatever owns the per-device stream pipelines.
//!
//! The controller never starts or stops pipelines itself; it asks the
//! lifecycle collaborator to trigger activation and to report readiness.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::resilience::RetryableError;

/// Acknowledgement that an activation trigger was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationAck {
    /// Media server path the device is published on.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    /// Worth retrying: connection refused, 5xx, and similar.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying will not help: unknown device, rejected request.
    #[error("permanent: {0}")]
    Permanent(String),

    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

impl RetryableError for LifecycleError {
    fn is_transient(&self) -> bool {
        !matches!(self, LifecycleError::Permanent(_))
    }

    fn timed_out(after: Duration) -> Self {
        LifecycleError::Timeout(after)
    }
}

#[async_trait]
pub trait StreamLifecycle: Send + Sync {
    /// Ask for the device's stream to be brought up.
    async fn trigger_activation(&self, device_id: &str) -> Result<ActivationAck, LifecycleError>;

    /// Whether the media server reports the device's path as ready.
    async fn check_path_ready(&self, device_id: &str) -> Result<bool, LifecycleError>;

    /// Tier 1 local check, e.g. a capture device that can be read directly.
    async fn direct_capture_ready(&self, _device_id: &str) -> Result<bool, LifecycleError> {
        Ok(false)
    }

    /// Best-effort abort of an activation nobody is waiting for any more.
    async fn cancel_activation(&self, _device_id: &str) {}
}
