//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::Instant;

use camera_service::config::{LiveConfig, ServiceConfig};
use camera_service::health::{HealthProbe, ProbeError};
use camera_service::resilience::{CircuitBreaker, CircuitBreakerSettings};
use camera_service::streams::{ActivationAck, LifecycleError, StreamLifecycle, StreamReadinessController};

/// How the fake's media server path behaves.
#[derive(Debug, Clone, Copy)]
pub enum PathBehavior {
    /// Already published before anything is triggered.
    AlreadyReady,
    /// Ready this long after the first successful trigger.
    ReadyAfterTrigger(Duration),
    Never,
    /// `check_path_ready` never answers.
    Hang,
}

/// Scriptable stand-in for the stream lifecycle collaborator.
pub struct FakeLifecycle {
    pub triggers: AtomicU32,
    pub checks: AtomicU32,
    pub cancels: AtomicU32,
    path: PathBehavior,
    direct_after: Option<Duration>,
    trigger_delay: Duration,
    triggered_at: Mutex<Option<Instant>>,
}

impl FakeLifecycle {
    pub fn new(path: PathBehavior) -> Self {
        Self {
            triggers: AtomicU32::new(0),
            checks: AtomicU32::new(0),
            cancels: AtomicU32::new(0),
            path,
            direct_after: None,
            trigger_delay: Duration::ZERO,
            triggered_at: Mutex::new(None),
        }
    }

    /// Tier 1 reports ready after `delay`.
    pub fn with_direct_capture(mut self, delay: Duration) -> Self {
        self.direct_after = Some(delay);
        self
    }

    /// Each trigger takes `delay` to acknowledge.
    pub fn with_trigger_delay(mut self, delay: Duration) -> Self {
        self.trigger_delay = delay;
        self
    }

    pub fn trigger_count(&self) -> u32 {
        self.triggers.load(Ordering::SeqCst)
    }

    pub fn check_count(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamLifecycle for FakeLifecycle {
    async fn trigger_activation(&self, device_id: &str) -> Result<ActivationAck, LifecycleError> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.trigger_delay).await;
        self.triggered_at.lock().unwrap().get_or_insert_with(Instant::now);
        Ok(ActivationAck { path: device_id.to_string() })
    }

    async fn check_path_ready(&self, _device_id: &str) -> Result<bool, LifecycleError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.path {
            PathBehavior::AlreadyReady => Ok(true),
            PathBehavior::ReadyAfterTrigger(after) => {
                let triggered_at = *self.triggered_at.lock().unwrap();
                Ok(triggered_at.is_some_and(|at| at.elapsed() >= after))
            }
            PathBehavior::Never => Ok(false),
            PathBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(false)
            }
        }
    }

    async fn direct_capture_ready(&self, _device_id: &str) -> Result<bool, LifecycleError> {
        match self.direct_after {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cancel_activation(&self, _device_id: &str) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Probe returning scripted outcomes, then `fallback` forever.
pub struct FakeProbe {
    outcomes: Mutex<VecDeque<bool>>,
    fallback: bool,
    calls: Mutex<Vec<Instant>>,
}

impl FakeProbe {
    pub fn new(outcomes: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(healthy: bool) -> Self {
        Self::new(std::iter::empty(), healthy)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        self.calls.lock().unwrap().push(Instant::now());
        let healthy = self.outcomes.lock().unwrap().pop_front().unwrap_or(self.fallback);
        if healthy {
            Ok(())
        } else {
            Err(ProbeError::Status(503))
        }
    }
}

/// Defaults with deterministic jitter.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.mediamtx.backoff_jitter_range = [1.0, 1.0];
    config
}

pub fn breaker_for(config: &ServiceConfig) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(CircuitBreakerSettings::from_config(&config.mediamtx)))
}

pub fn controller_with(
    config: ServiceConfig,
    lifecycle: Arc<FakeLifecycle>,
) -> (StreamReadinessController, Arc<CircuitBreaker>) {
    let breaker = breaker_for(&config);
    let controller = StreamReadinessController::new(lifecycle, breaker.clone(), LiveConfig::new(config), None);
    (controller, breaker)
}

/// Requests seen by a mock server, as request-target paths.
pub type SeenPaths = Arc<Mutex<Vec<String>>>;

/// Start a mock MediaMTX answering every request with `route(path)`.
pub async fn start_mock_mediamtx<F>(route: F) -> (SocketAddr, SeenPaths)
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    start_slow_mock_mediamtx(Duration::ZERO, route).await
}

/// Like [`start_mock_mediamtx`], waiting `delay` before each response.
pub async fn start_slow_mock_mediamtx<F>(delay: Duration, route: F) -> (SocketAddr, SeenPaths)
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenPaths = Arc::new(Mutex::new(Vec::new()));
    let route = Arc::new(route);
    let seen_by_server = seen.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let route = route.clone();
                    let seen = seen_by_server.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(socket);
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).await.is_err() {
                            return;
                        }
                        // Drain headers.
                        let mut line = String::new();
                        while reader.read_line(&mut line).await.map(|n| n > 2).unwrap_or(false) {
                            line.clear();
                        }

                        let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
                        seen.lock().unwrap().push(path.clone());
                        let (status, body) = route(&path);
                        tokio::time::sleep(delay).await;
                        let status_text = match status {
                            200 => "200 OK",
                            401 => "401 Unauthorized",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let mut socket = reader.into_inner();
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, seen)
}

/// Config pointing both MediaMTX ports at `addr`.
pub fn config_for_mock(addr: SocketAddr) -> ServiceConfig {
    let mut config = test_config();
    config.mediamtx.host = addr.ip().to_string();
    config.mediamtx.api_port = addr.port();
    config.mediamtx.hls_port = addr.port();
    config
}
