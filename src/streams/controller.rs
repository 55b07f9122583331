//! Tiered stream readiness.
//!
//! # Responsibilities
//! - Coalesce concurrent requests per device into one activation
//! - Walk the tiers: local fast path, passive ready check, on-demand activation
//! - Fail fast while the media server circuit is open
//! - Bound every request by its purpose's total budget
//! - Classify ready outcomes by latency
//!
//! The activation task works to the budget of the caller that started it.
//! A caller joining with another purpose keeps its own deadline: if that
//! ends first it gets its own fallback or deadline error, measured from its
//! own request, while the shared activation keeps going.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::{LiveConfig, ServiceConfig};
use crate::events::{EventBus, ProgressEvent, ServiceEvent};
use crate::observability::metrics;
use crate::resilience::{with_retry, BackoffPolicy, CircuitBreaker, Deadline, RetryError, RetrySchedule, RetryableError};
use crate::streams::active::ActiveStreams;
use crate::streams::classify::ResponseThresholds;
use crate::streams::inflight::{wait_for, Activation, InFlightMap, Outcome, WaitOutcome, WaiterGuard};
use crate::streams::lifecycle::StreamLifecycle;
use crate::streams::types::{Purpose, ReadinessError, ReadinessRequest, ReadinessResult, ReadinessStatus, Tier};

/// How a polling phase ended.
enum PollEnd {
    Ready,
    Expired,
    Failed(String),
}

struct Inner {
    lifecycle: Arc<dyn StreamLifecycle>,
    breaker: Arc<CircuitBreaker>,
    config: LiveConfig,
    events: Option<EventBus>,
    inflight: InFlightMap,
    active: ActiveStreams,
}

#[derive(Clone)]
pub struct StreamReadinessController {
    inner: Arc<Inner>,
}

impl StreamReadinessController {
    /// Progress events go to `events` when given and enabled in the config.
    pub fn new(
        lifecycle: Arc<dyn StreamLifecycle>,
        breaker: Arc<CircuitBreaker>,
        config: LiveConfig,
        events: Option<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle,
                breaker,
                config,
                events,
                inflight: InFlightMap::new(),
                active: ActiveStreams::new(),
            }),
        }
    }

    /// Make sure the device's stream is usable for `purpose`.
    pub async fn ensure_ready(&self, device_id: &str, purpose: Purpose) -> Result<ReadinessResult, ReadinessError> {
        self.ensure_ready_cancellable(device_id, purpose, &CancellationToken::new()).await
    }

    /// [`ensure_ready`](Self::ensure_ready) that gives up when `cancel` fires.
    ///
    /// Cancelling only ends this caller's wait; the activation keeps going
    /// for any other caller attached to it.
    pub async fn ensure_ready_cancellable(
        &self,
        device_id: &str,
        purpose: Purpose,
        cancel: &CancellationToken,
    ) -> Result<ReadinessResult, ReadinessError> {
        let config = self.inner.config.load();
        let request = ReadinessRequest::new(device_id, purpose, budget_for(&config, purpose));

        let (activation, created) = self.inner.inflight.join(device_id);
        if created {
            metrics::record_inflight(self.inner.inflight.len());
            tokio::spawn(run_activation(
                self.inner.clone(),
                activation.clone(),
                request.clone(),
                config.clone(),
            ));
        } else {
            tracing::debug!(device = device_id, waiters = activation.waiters(), "Joined in-flight activation");
        }

        let cancel_if_last = config.mediamtx.stream_readiness.cancel_unobserved_activations;
        let guard = WaiterGuard::new(&self.inner.inflight, activation, cancel_if_last);

        let outcome = match wait_for(guard.activation(), &request.deadline, cancel).await {
            WaitOutcome::Settled(outcome) => {
                guard.settle();
                outcome
            }
            WaitOutcome::Cancelled => {
                if guard.leave(cancel_if_last) {
                    tracing::info!(device = device_id, "Last caller cancelled, abandoning activation");
                }
                Err(ReadinessError::Cancelled { device_id: device_id.to_string() })
            }
            WaitOutcome::Expired => {
                let tier = guard.activation().tier();
                guard.leave(false);
                expired(&config, &request, tier, request.deadline.elapsed())
            }
        };

        match &outcome {
            Ok(result) => {
                metrics::record_readiness(result.status, result.tier_reached, result.elapsed);
                tracing::debug!(
                    device = device_id,
                    purpose = %purpose,
                    status = %result.status,
                    tier = result.tier_reached.as_u8(),
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    fallback = result.fallback_applied,
                    "Readiness resolved"
                );
            }
            Err(e) => tracing::warn!(device = device_id, purpose = %purpose, error = %e, "Readiness failed"),
        }
        outcome
    }

    /// Drop the device from the local active cache, e.g. after its pipeline stopped.
    pub fn mark_inactive(&self, device_id: &str) -> bool {
        self.inner.active.mark_inactive(device_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.inflight.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }
}

fn budget_for(config: &ServiceConfig, purpose: Purpose) -> std::time::Duration {
    match purpose {
        Purpose::Snapshot => config.performance.snapshot_tiers.total_operation_timeout(),
        Purpose::Recording => config.mediamtx.stream_readiness.timeout(),
    }
}

/// Budget ran out: degraded success or error depending on config.
fn expired(config: &ServiceConfig, request: &ReadinessRequest, tier: Tier, elapsed: std::time::Duration) -> Outcome {
    if config.mediamtx.stream_readiness.graceful_fallback {
        Ok(ReadinessResult::fallback(elapsed, tier))
    } else {
        Err(ReadinessError::DeadlineExceeded {
            device_id: request.device_id.clone(),
            budget: request.deadline.budget(),
            tier,
        })
    }
}

async fn run_activation(inner: Arc<Inner>, activation: Arc<Activation>, request: ReadinessRequest, config: Arc<ServiceConfig>) {
    let cancel = activation.cancellation();
    let walk = AssertUnwindSafe(walk_tiers(&inner, &activation, &request, &config)).catch_unwind();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            inner.lifecycle.cancel_activation(&request.device_id).await;
            Err(ReadinessError::Aborted { device_id: request.device_id.clone() })
        }
        result = walk => match result {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(device = %request.device_id, "Activation task panicked");
                Err(ReadinessError::Aborted { device_id: request.device_id.clone() })
            }
        }
    };

    inner.inflight.complete(&activation, outcome);
    metrics::record_inflight(inner.inflight.len());
}

async fn walk_tiers(inner: &Inner, activation: &Activation, request: &ReadinessRequest, config: &ServiceConfig) -> Outcome {
    let device = request.device_id.as_str();
    let deadline = &request.deadline;
    let tiers = &config.performance.snapshot_tiers;
    let readiness = &config.mediamtx.stream_readiness;
    let thresholds = ResponseThresholds::from_config(tiers);

    // Tier 1: locally known or directly capturable.
    activation.enter_tier(Tier::Direct);
    if inner.active.is_active(device) {
        return Ok(ReadinessResult::ready(ReadinessStatus::Immediate, deadline.elapsed(), Tier::Direct));
    }
    match deadline.child(tiers.tier1_timeout()).run(inner.lifecycle.direct_capture_ready(device)).await {
        Ok(Ok(true)) => {
            inner.active.mark_active(device, readiness.active_stream_ttl());
            return Ok(ReadinessResult::ready(ReadinessStatus::Immediate, deadline.elapsed(), Tier::Direct));
        }
        Ok(Ok(false)) => {}
        Ok(Err(e)) => tracing::debug!(device, error = %e, "Direct capture check failed"),
        Err(_) => tracing::debug!(device, "Direct capture check timed out"),
    }

    // Nothing past Tier 1 is worth trying against a server known to be down.
    if inner.breaker.is_open() {
        tracing::debug!(device, retry_after = ?inner.breaker.retry_after(), "Circuit open, failing fast");
        return Ok(ReadinessResult::failed(deadline.elapsed(), Tier::ReadyCheck, "circuit open"));
    }

    // Tier 2: is the path already up?
    activation.enter_tier(Tier::ReadyCheck);
    let tier2 = deadline.child(tiers.tier2_timeout());
    match poll_until_ready(inner, request, config, Tier::ReadyCheck, &tier2).await {
        PollEnd::Ready => {
            inner.active.mark_active(device, readiness.active_stream_ttl());
            let elapsed = deadline.elapsed();
            return Ok(ReadinessResult::ready(thresholds.classify(elapsed), elapsed, Tier::ReadyCheck));
        }
        PollEnd::Expired => {}
        PollEnd::Failed(reason) => tracing::debug!(device, reason = %reason, "Ready check failed, escalating"),
    }

    if deadline.is_expired() {
        return expired(config, request, Tier::ReadyCheck, deadline.elapsed());
    }

    // Tier 3: trigger activation, then wait for the path.
    if inner.breaker.is_open() {
        return Ok(ReadinessResult::failed(deadline.elapsed(), Tier::ReadyCheck, "circuit open"));
    }
    activation.enter_tier(Tier::Activation);
    let tier3 = deadline.child(tiers.tier3_timeout());
    let schedule = RetrySchedule {
        backoff: BackoffPolicy::from_mediamtx(&config.mediamtx, readiness.retry_delay()),
        max_retries: readiness.retry_attempts,
        attempt_timeout: tiers.trigger_timeout(),
    };

    let trigger = with_retry(&schedule, &tier3, "activation_trigger", |attempt| {
        metrics::record_trigger();
        tracing::debug!(device, attempt, "Triggering activation");
        inner.lifecycle.trigger_activation(device)
    })
    .await;

    match trigger {
        Ok(ack) => tracing::info!(device, path = %ack.path, "Activation triggered"),
        Err(RetryError::DeadlineExceeded { attempts, .. }) => {
            tracing::warn!(device, attempts, "Activation trigger ran out of time");
            return expired(config, request, Tier::Activation, deadline.elapsed());
        }
        Err(RetryError::Exhausted { attempts, last }) => {
            return Ok(ReadinessResult::failed(
                deadline.elapsed(),
                Tier::Activation,
                format!("activation trigger failed after {attempts} attempts: {last}"),
            ));
        }
        Err(RetryError::Permanent(e)) => {
            return Ok(ReadinessResult::failed(
                deadline.elapsed(),
                Tier::Activation,
                format!("activation trigger rejected: {e}"),
            ));
        }
    }

    match poll_until_ready(inner, request, config, Tier::Activation, &tier3).await {
        PollEnd::Ready => {
            inner.active.mark_active(device, readiness.active_stream_ttl());
            let elapsed = deadline.elapsed();
            Ok(ReadinessResult::ready(thresholds.classify(elapsed), elapsed, Tier::Activation))
        }
        PollEnd::Expired => expired(config, request, Tier::Activation, deadline.elapsed()),
        PollEnd::Failed(reason) => Ok(ReadinessResult::failed(deadline.elapsed(), Tier::Activation, reason)),
    }
}

/// Poll `check_path_ready` every check interval until ready or `budget` ends.
///
/// Transient errors are retried up to the configured retry count with
/// backoff; a permanent error ends the phase.
async fn poll_until_ready(
    inner: &Inner,
    request: &ReadinessRequest,
    config: &ServiceConfig,
    tier: Tier,
    budget: &Deadline,
) -> PollEnd {
    let device = request.device_id.as_str();
    let readiness = &config.mediamtx.stream_readiness;
    let backoff = BackoffPolicy::from_mediamtx(&config.mediamtx, readiness.retry_delay());
    let mut tick = 0u32;
    let mut failures = 0u32;

    loop {
        if budget.is_expired() {
            return PollEnd::Expired;
        }

        let wait = match budget.run(inner.lifecycle.check_path_ready(device)).await {
            Ok(Ok(true)) => return PollEnd::Ready,
            Ok(Ok(false)) => {
                failures = 0;
                readiness.check_interval()
            }
            Ok(Err(e)) if e.is_transient() => {
                failures += 1;
                if failures > readiness.retry_attempts {
                    return PollEnd::Failed(format!("readiness check failed after {failures} attempts: {e}"));
                }
                tracing::debug!(device, %tier, failures, error = %e, "Readiness check failed, retrying");
                backoff.compute_delay(failures - 1).max(readiness.check_interval())
            }
            Ok(Err(e)) => return PollEnd::Failed(format!("readiness check rejected: {e}")),
            Err(_) => return PollEnd::Expired,
        };

        if readiness.enable_progress_notifications {
            if let Some(events) = &inner.events {
                events.publish(ServiceEvent::Progress(ProgressEvent {
                    device_id: request.device_id.clone(),
                    purpose: request.purpose,
                    tier,
                    elapsed: request.deadline.elapsed(),
                    tick,
                }));
            }
        }
        tick += 1;

        budget.sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::resilience::CircuitBreakerSettings;
    use crate::streams::lifecycle::{ActivationAck, LifecycleError};

    /// Path becomes ready `ready_after` past the first trigger.
    struct Scripted {
        triggers: AtomicU32,
        triggered_at: std::sync::Mutex<Option<Instant>>,
        ready_after: Duration,
        trigger_errors: AtomicU32,
    }

    impl Scripted {
        fn new(ready_after: Duration) -> Self {
            Self {
                triggers: AtomicU32::new(0),
                triggered_at: std::sync::Mutex::new(None),
                ready_after,
                trigger_errors: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl StreamLifecycle for Scripted {
        async fn trigger_activation(&self, device_id: &str) -> Result<ActivationAck, LifecycleError> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            if self.trigger_errors.load(Ordering::SeqCst) > 0 {
                self.trigger_errors.fetch_sub(1, Ordering::SeqCst);
                return Err(LifecycleError::Transient("connection refused".into()));
            }
            self.triggered_at.lock().unwrap().get_or_insert_with(Instant::now);
            Ok(ActivationAck { path: device_id.to_string() })
        }

        async fn check_path_ready(&self, _device_id: &str) -> Result<bool, LifecycleError> {
            let at = *self.triggered_at.lock().unwrap();
            Ok(at.map(|t| t.elapsed() >= self.ready_after).unwrap_or(false))
        }
    }

    fn config() -> LiveConfig {
        let mut config = ServiceConfig::default();
        config.mediamtx.stream_readiness.retry_delay_ms = 100;
        config.mediamtx.backoff_jitter_range = [1.0, 1.0];
        LiveConfig::new(config)
    }

    fn controller(lifecycle: Arc<Scripted>, config: LiveConfig, events: Option<EventBus>) -> StreamReadinessController {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerSettings::from_config(&config.load().mediamtx)));
        StreamReadinessController::new(lifecycle, breaker, config, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_served_from_active_cache() {
        let lifecycle = Arc::new(Scripted::new(Duration::from_millis(500)));
        let controller = controller(lifecycle.clone(), config(), None);

        let first = controller.ensure_ready("cam0", Purpose::Snapshot).await.unwrap();
        assert_eq!(first.tier_reached, Tier::Activation);

        let second = controller.ensure_ready("cam0", Purpose::Snapshot).await.unwrap();
        assert_eq!(second.status, ReadinessStatus::Immediate);
        assert_eq!(second.tier_reached, Tier::Direct);
        assert_eq!(lifecycle.triggers.load(Ordering::SeqCst), 1);

        assert!(controller.mark_inactive("cam0"));
        let third = controller.ensure_ready("cam0", Purpose::Snapshot).await.unwrap();
        assert_eq!(third.tier_reached, Tier::ReadyCheck);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_trigger_failures_are_retried() {
        let lifecycle = Arc::new(Scripted::new(Duration::ZERO));
        lifecycle.trigger_errors.store(2, Ordering::SeqCst);
        let controller = controller(lifecycle.clone(), config(), None);

        let result = controller.ensure_ready("cam0", Purpose::Snapshot).await.unwrap();
        assert!(result.is_ready());
        assert_eq!(result.tier_reached, Tier::Activation);
        assert_eq!(lifecycle.triggers.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_trigger_is_failed() {
        let lifecycle = Arc::new(Scripted::new(Duration::ZERO));
        lifecycle.trigger_errors.store(100, Ordering::SeqCst);
        let controller = controller(lifecycle.clone(), config(), None);

        let result = controller.ensure_ready("cam0", Purpose::Snapshot).await.unwrap();
        assert_eq!(result.status, ReadinessStatus::Failed);
        assert_eq!(result.tier_reached, Tier::Activation);
        assert!(!result.fallback_applied);
        // One attempt plus three retries.
        assert_eq!(lifecycle.triggers.load(Ordering::SeqCst), 4);
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_fallback_is_error() {
        let lifecycle = Arc::new(Scripted::new(Duration::from_secs(3600)));
        let config = config();
        let mut next = (*config.load()).clone();
        next.mediamtx.stream_readiness.graceful_fallback = false;
        config.store(next);
        let controller = controller(lifecycle, config, None);

        let err = controller.ensure_ready("cam0", Purpose::Snapshot).await.unwrap_err();
        assert!(matches!(err, ReadinessError::DeadlineExceeded { tier: Tier::Activation, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_events_published() {
        let lifecycle = Arc::new(Scripted::new(Duration::from_millis(1000)));
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let controller = controller(lifecycle, config(), Some(bus));

        controller.ensure_ready("cam0", Purpose::Recording).await.unwrap();

        let mut tiers = Vec::new();
        while let Ok(ServiceEvent::Progress(event)) = rx.try_recv() {
            assert_eq!(event.purpose, Purpose::Recording);
            tiers.push(event.tier);
        }
        assert!(tiers.contains(&Tier::ReadyCheck));
        assert!(tiers.contains(&Tier::Activation));
    }
}
