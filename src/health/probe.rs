//! Liveness probe of the media server.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// One liveness check. Any error counts as a failed probe.
    async fn probe(&self) -> Result<(), ProbeError>;
}
