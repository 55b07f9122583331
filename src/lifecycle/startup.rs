//! Startup orchestration.
//!
//! # Responsibilities
//! - Wire the breaker, monitor, controller and event bus from one config
//! - Start background tasks (health monitor, config watcher, metrics, admin API)
//! - Run until a shutdown signal, then stop everything in order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The admin listener binds last, once everything it serves is running

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::admin::{self, AdminState};
use crate::config::watcher::{change_source_for, ConfigReloader, ConfigWatcher};
use crate::config::{LiveConfig, ServiceConfig};
use crate::events::{EventBus, ServiceEvent};
use crate::health::{HealthMonitor, HealthProbe};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::observability::metrics;
use crate::resilience::{CircuitBreaker, CircuitBreakerSettings};
use crate::streams::{MediaMtxClient, StreamLifecycle, StreamReadinessController};

/// How long background tasks get to finish after shutdown is triggered.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build MediaMTX client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid {field} address '{value}'")]
    Address { field: &'static str, value: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Handles of the tasks started by [`CameraService::start`].
pub struct ServiceTasks {
    event_log: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

/// The assembled service.
pub struct CameraService {
    config: LiveConfig,
    config_path: Option<PathBuf>,
    events: EventBus,
    monitor: Arc<HealthMonitor>,
    controller: StreamReadinessController,
    shutdown: Shutdown,
    started_at: Instant,
}

impl CameraService {
    /// Build against a real MediaMTX instance.
    pub fn build(config: ServiceConfig, config_path: Option<PathBuf>) -> Result<Self, StartupError> {
        let live = LiveConfig::new(config);
        let client = Arc::new(MediaMtxClient::new(live.clone())?);
        Ok(Self::with_collaborators(live, config_path, client.clone(), client))
    }

    /// Build with any probe and lifecycle implementation.
    pub fn with_collaborators(
        config: LiveConfig,
        config_path: Option<PathBuf>,
        probe: Arc<dyn HealthProbe>,
        lifecycle: Arc<dyn StreamLifecycle>,
    ) -> Self {
        let snapshot = config.load();
        let events = EventBus::new(snapshot.events.channel_capacity);
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerSettings::from_config(&snapshot.mediamtx)));

        let monitor = Arc::new(HealthMonitor::new(probe, breaker.clone(), config.clone(), Some(events.clone())));
        let controller = StreamReadinessController::new(lifecycle, breaker, config.clone(), Some(events.clone()));

        Self {
            config,
            config_path,
            events,
            monitor,
            controller,
            shutdown: Shutdown::new(),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn controller(&self) -> &StreamReadinessController {
        &self.controller
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    fn reloader(&self) -> Option<ConfigReloader> {
        self.config_path
            .as_deref()
            .map(|path| ConfigReloader::new(path, self.config.clone(), Some(self.events.clone())))
    }

    /// Start background tasks and serve until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), StartupError> {
        let tasks = self.start().await?;
        signals::handle_signals(&self.shutdown, self.reloader().as_ref()).await;
        self.stop(tasks).await;
        Ok(())
    }

    /// Start background tasks. Returns their handles for [`stop`](Self::stop).
    pub async fn start(&self) -> Result<ServiceTasks, StartupError> {
        let config = self.config.load();
        let mut tasks = Vec::new();

        if config.observability.metrics_enabled {
            let addr = parse_addr("observability.metrics_address", &config.observability.metrics_address)?;
            metrics::init_metrics(addr)?;
        }

        let event_log = self.events.spawn_subscriber("event-log", log_event);

        self.monitor.start();

        if let (Some(reloader), true) = (self.reloader(), config.watch.enabled) {
            let source = change_source_for(reloader.path(), &config.watch);
            let watcher = ConfigWatcher::new(reloader, source);
            let shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = watcher.run(shutdown).await {
                    tracing::error!(error = %e, "Config watcher failed; hot reload disabled");
                }
            }));
        }

        if config.admin.enabled {
            let addr = parse_addr("admin.bind_address", &config.admin.bind_address)?;
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| StartupError::Bind { addr, source })?;
            let state = AdminState {
                config: self.config.clone(),
                monitor: self.monitor.clone(),
                controller: self.controller.clone(),
                started_at: self.started_at,
            };
            let shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = admin::serve(listener, state, shutdown).await {
                    tracing::error!(error = %e, "Admin API stopped with error");
                }
            }));
        }

        tracing::info!(
            mediamtx = %config.mediamtx.api_base_url(),
            admin = config.admin.enabled,
            watch = config.watch.enabled && self.config_path.is_some(),
            "Camera service started"
        );
        Ok(ServiceTasks { event_log, background: tasks })
    }

    /// Trigger shutdown, stop the monitor and wait for background tasks.
    pub async fn stop(&self, tasks: ServiceTasks) {
        self.shutdown.trigger();
        self.monitor.stop().await;

        let ServiceTasks { event_log, background } = tasks;
        let drain = async move {
            for task in background {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Background tasks did not finish in time");
        }

        // The subscriber only ends when every bus handle is dropped.
        event_log.abort();
        tracing::info!("Shutdown complete");
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address { field, value: value.to_string() })
}

fn log_event(event: &ServiceEvent) {
    match event {
        ServiceEvent::Progress(progress) => tracing::trace!(
            device = %progress.device_id,
            tier = progress.tier.as_u8(),
            tick = progress.tick,
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "Readiness in progress"
        ),
        ServiceEvent::CircuitTransition { from, to } => {
            tracing::debug!(%from, %to, "Circuit transition event")
        }
        ServiceEvent::ConfigReloaded { generation, source } => {
            tracing::debug!(generation, source = %source, "Config reloaded event")
        }
    }
}
