//! Periodic MediaMTX health probing.
//!
//! # Responsibilities
//! - Probe on the health check interval while Closed or HalfOpen
//! - While Open, sleep until the breaker admits the trial probe
//! - Feed every outcome into the circuit breaker
//! - Push reloaded thresholds and timings into the breaker before each probe
//! - Announce circuit transitions (log, metrics, events)

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LiveConfig;
use crate::events::{EventBus, ServiceEvent};
use crate::health::probe::HealthProbe;
use crate::health::state::{HealthStatus, ProbeStats};
use crate::observability::metrics;
use crate::resilience::{CircuitBreaker, CircuitBreakerSettings, CircuitState, CircuitTransition};

enum RunState {
    Idle,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
}

struct Shared {
    probe: Arc<dyn HealthProbe>,
    breaker: Arc<CircuitBreaker>,
    config: LiveConfig,
    events: Option<EventBus>,
    stats: Mutex<ProbeStats>,
}

pub struct HealthMonitor {
    shared: Arc<Shared>,
    run: Mutex<RunState>,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>, breaker: Arc<CircuitBreaker>, config: LiveConfig, events: Option<EventBus>) -> Self {
        Self {
            shared: Arc::new(Shared {
                probe,
                breaker,
                config,
                events,
                stats: Mutex::new(ProbeStats::default()),
            }),
            run: Mutex::new(RunState::Idle),
        }
    }

    /// Start the probe loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut run = self.run.lock().expect("monitor state mutex poisoned");
        if matches!(*run, RunState::Running { .. }) {
            return false;
        }

        let cancel = CancellationToken::new();
        let shared = self.shared.clone();
        let task = tokio::spawn(probe_loop(shared, cancel.clone()));
        *run = RunState::Running { cancel, task };

        metrics::record_circuit_state(self.shared.breaker.state());
        tracing::info!(
            interval_secs = self.shared.config.load().mediamtx.health_check_interval_secs,
            "Health monitor started"
        );
        true
    }

    /// Stop the probe loop, waiting for an in-flight probe to finish.
    ///
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let previous = {
            let mut run = self.run.lock().expect("monitor state mutex poisoned");
            std::mem::replace(&mut *run, RunState::Idle)
        };

        match previous {
            RunState::Idle => false,
            RunState::Running { cancel, task } => {
                cancel.cancel();
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "Health monitor task ended abnormally");
                }
                tracing::info!("Health monitor stopped");
                true
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.run.lock().expect("monitor state mutex poisoned"), RunState::Running { .. })
    }

    /// True iff the circuit is Closed.
    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn state(&self) -> CircuitState {
        self.shared.breaker.state()
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.shared.breaker.clone()
    }

    pub fn health_status(&self) -> HealthStatus {
        let stats = self.shared.stats.lock().expect("probe stats mutex poisoned").clone();
        let circuit = self.shared.breaker.snapshot();
        HealthStatus::build(&circuit, &stats, circuit.retry_after())
    }
}

async fn probe_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let config = shared.config.load();
        let interval = config.mediamtx.health_check_interval();
        shared.breaker.apply(CircuitBreakerSettings::from_config(&config.mediamtx));

        let (allowed, transition) = shared.breaker.admit_probe();
        if let Some(transition) = transition {
            shared.announce(transition);
        }
        if allowed {
            shared.probe_once().await;
        }

        // While open, the next probe is due when the open period ends.
        let wait = shared.breaker.retry_after().unwrap_or(interval);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
    tracing::debug!("Health monitor loop exited");
}

impl Shared {
    async fn probe_once(&self) {
        let timeout = self.config.load().mediamtx.health_probe_timeout();
        let success = match tokio::time::timeout(timeout, self.probe.probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "MediaMTX health probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "MediaMTX health probe timed out");
                false
            }
        };

        self.stats.lock().expect("probe stats mutex poisoned").record(success);
        metrics::record_probe(success);

        if let Some(transition) = self.breaker.record_outcome(success) {
            self.announce(transition);
        }
    }

    fn announce(&self, transition: CircuitTransition) {
        match transition.to {
            CircuitState::Open => tracing::warn!(
                from = %transition.from,
                retry_after_ms = self.breaker.retry_after().map(|d: Duration| d.as_millis() as u64),
                "MediaMTX circuit opened"
            ),
            _ => tracing::info!(from = %transition.from, to = %transition.to, "MediaMTX circuit transition"),
        }

        metrics::record_circuit_state(transition.to);
        if let Some(events) = &self.events {
            events.publish(ServiceEvent::CircuitTransition {
                from: transition.from,
                to: transition.to,
            });
        }
    }
}
