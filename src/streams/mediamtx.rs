//! MediaMTX control API client.
//!
//! Implements both collaborator interfaces over HTTP:
//! - probe: `GET {api}/v3/paths/list`, healthy on any 2xx
//! - path readiness: `GET {api}/v3/paths/get/{path}`, 404 means not ready
//! - activation: `GET {hls}/{path}/index.m3u8`, which makes MediaMTX run
//!   the path's on-demand command; 2xx and 404 (source still starting)
//!   count as acknowledged, 5xx and 429 are transient failures
//!
//! Readiness checks use the probe timeout; the controller's deadline caps
//! each call further.
//!
//! Base URLs are read from the live config on every call so a host change
//! takes effect after reload.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::LiveConfig;
use crate::health::probe::{HealthProbe, ProbeError};
use crate::streams::lifecycle::{ActivationAck, LifecycleError, StreamLifecycle};

const DEVICE_PREFIX: &str = "/dev/video";

/// Map a device id to its MediaMTX path name.
///
/// `/dev/video0` becomes `camera0`; anything else is used as-is.
pub fn stream_path_name(device_id: &str) -> String {
    match device_id.strip_prefix(DEVICE_PREFIX) {
        Some(index) if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) => {
            format!("camera{index}")
        }
        _ => device_id.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct PathInfo {
    #[serde(default)]
    ready: bool,
}

#[derive(Clone)]
pub struct MediaMtxClient {
    http: reqwest::Client,
    config: LiveConfig,
}

impl MediaMtxClient {
    pub fn new(config: LiveConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("camera-service/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()?;
        Ok(Self { http, config })
    }

    fn api_url(&self, suffix: &str) -> String {
        format!("{}{}", self.config.load().mediamtx.api_base_url(), suffix)
    }

    fn hls_url(&self, suffix: &str) -> String {
        format!("{}{}", self.config.load().mediamtx.hls_base_url(), suffix)
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> LifecycleError {
    if e.is_timeout() {
        LifecycleError::Timeout(timeout)
    } else {
        LifecycleError::Transient(e.to_string())
    }
}

fn status_error(status: StatusCode, what: &str) -> LifecycleError {
    let message = format!("{what} returned {status}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        LifecycleError::Transient(message)
    } else {
        LifecycleError::Permanent(message)
    }
}

#[async_trait]
impl HealthProbe for MediaMtxClient {
    async fn probe(&self) -> Result<(), ProbeError> {
        let timeout = self.config.load().mediamtx.health_probe_timeout();
        let res = self
            .http
            .get(self.api_url("/v3/paths/list"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Transport(e.to_string())
                }
            })?;

        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl StreamLifecycle for MediaMtxClient {
    async fn trigger_activation(&self, device_id: &str) -> Result<ActivationAck, LifecycleError> {
        let path = stream_path_name(device_id);
        let timeout = self.config.load().performance.snapshot_tiers.trigger_timeout();

        let res = self
            .http
            .get(self.hls_url(&format!("/{path}/index.m3u8")))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = res.status();
        if !(status.is_success() || status == StatusCode::NOT_FOUND) {
            return Err(status_error(status, "hls trigger"));
        }

        tracing::debug!(device = device_id, path = %path, status = status.as_u16(), "Activation trigger acknowledged");
        Ok(ActivationAck { path })
    }

    async fn check_path_ready(&self, device_id: &str) -> Result<bool, LifecycleError> {
        let path = stream_path_name(device_id);
        let timeout = self.config.load().mediamtx.health_probe_timeout();

        let res = self
            .http
            .get(self.api_url(&format!("/v3/paths/get/{path}")))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(status_error(status, "paths/get"));
        }

        let info: PathInfo = res
            .json()
            .await
            .map_err(|e| LifecycleError::Transient(format!("invalid paths/get body: {e}")))?;
        Ok(info.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_path_name() {
        assert_eq!(stream_path_name("/dev/video0"), "camera0");
        assert_eq!(stream_path_name("/dev/video12"), "camera12");
        assert_eq!(stream_path_name("/dev/videoX"), "/dev/videoX");
        assert_eq!(stream_path_name("/dev/video"), "/dev/video");
        assert_eq!(stream_path_name("front-door"), "front-door");
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "x"),
            LifecycleError::Transient(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "x"),
            LifecycleError::Permanent(_)
        ));
    }
}
