//! Circuit breaker guarding the media server.
//!
//! # States
//! - Closed: media server assumed healthy, activations allowed
//! - Open: media server assumed down, activations fail fast
//! - Half-Open: trial probes decide whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: open period elapsed (taken by allow_probe)
//! Half-Open → Closed: recovery_successes >= recovery_confirmation_threshold
//! Half-Open → Open: any failure; open period grows with backoff_attempt
//! ```
//!
//! The first open period is exactly the configured timeout. Reopening
//! without an intervening Closed stretches it via [`BackoffPolicy`], capped at
//! the max backoff interval. All reads and transitions go through one mutex,
//! settings included, so [`CircuitBreaker::apply`] takes effect on the next
//! outcome.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::MediaMtxConfig;
use crate::resilience::backoff::BackoffPolicy;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge value: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// A state change produced by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub recovery_successes: u32,
    pub backoff_attempt: u32,
    pub opened_at: Option<Instant>,
    pub open_period: Duration,
}

impl CircuitSnapshot {
    /// Time left in the open period; `None` unless Open.
    pub fn retry_after(&self) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let elapsed = self.opened_at.map(|at| at.elapsed()).unwrap_or(Duration::MAX);
        Some(self.open_period.saturating_sub(elapsed))
    }
}

/// Thresholds and timings derived from the MediaMTX config.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub recovery_confirmation_threshold: u32,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl CircuitBreakerSettings {
    pub fn from_config(config: &MediaMtxConfig) -> Self {
        let timeout = config.health_circuit_breaker_timeout();
        let ceiling = config.health_max_backoff_interval().max(timeout);
        Self {
            failure_threshold: config.health_failure_threshold,
            recovery_confirmation_threshold: config.health_recovery_confirmation_threshold,
            timeout,
            backoff: BackoffPolicy::new(
                timeout,
                config.backoff_base_multiplier,
                config.backoff_jitter_range,
                ceiling,
            ),
        }
    }
}

struct Inner {
    settings: CircuitBreakerSettings,
    state: CircuitState,
    consecutive_failures: u32,
    recovery_successes: u32,
    opened_at: Option<Instant>,
    open_period: Duration,
    backoff_attempt: u32,
    rng: StdRng,
}

/// Closed/Open/HalfOpen breaker fed by health probe outcomes.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Build with a fixed jitter source (deterministic open periods).
    pub fn with_rng(settings: CircuitBreakerSettings, rng: StdRng) -> Self {
        let open_period = settings.timeout;
        Self {
            inner: Mutex::new(Inner {
                settings,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                recovery_successes: 0,
                opened_at: None,
                open_period,
                backoff_attempt: 0,
                rng,
            }),
        }
    }

    pub fn from_config(config: &MediaMtxConfig) -> Self {
        Self::new(CircuitBreakerSettings::from_config(config))
    }

    pub fn settings(&self) -> CircuitBreakerSettings {
        self.lock().settings.clone()
    }

    /// Swap in new settings, e.g. after a config reload. Returns whether they changed.
    ///
    /// Counters and the current open period are kept; the new thresholds
    /// apply from the next recorded outcome.
    pub fn apply(&self, settings: CircuitBreakerSettings) -> bool {
        let mut inner = self.lock();
        if inner.settings == settings {
            return false;
        }
        tracing::info!(
            failure_threshold = settings.failure_threshold,
            recovery_threshold = settings.recovery_confirmation_threshold,
            timeout_secs = settings.timeout.as_secs(),
            "Circuit breaker settings updated"
        );
        inner.settings = settings;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    /// Apply one probe outcome. Returns the transition if the state changed.
    pub fn record_outcome(&self, success: bool) -> Option<CircuitTransition> {
        let mut inner = self.lock();

        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.consecutive_failures = 0;
                None
            }
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                tracing::debug!(
                    failures = inner.consecutive_failures,
                    threshold = inner.settings.failure_threshold,
                    "Probe failure recorded"
                );
                if inner.consecutive_failures >= inner.settings.failure_threshold {
                    Some(self.open(&mut inner))
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.recovery_successes += 1;
                tracing::debug!(
                    successes = inner.recovery_successes,
                    threshold = inner.settings.recovery_confirmation_threshold,
                    "Recovery success recorded"
                );
                if inner.recovery_successes >= inner.settings.recovery_confirmation_threshold {
                    Some(self.close(&mut inner))
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, false) => {
                inner.recovery_successes = 0;
                inner.consecutive_failures += 1;
                Some(self.open(&mut inner))
            }
            (CircuitState::Open, _) => {
                tracing::trace!(success, "Outcome recorded while open (ignored)");
                None
            }
        }
    }

    /// Whether a probe may run now.
    ///
    /// Takes the Open → HalfOpen transition once the open period is over.
    pub fn allow_probe(&self) -> bool {
        self.admit_probe().0
    }

    /// Like [`allow_probe`](Self::allow_probe), also reporting the transition it made.
    pub fn admit_probe(&self) -> (bool, Option<CircuitTransition>) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => (true, None),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= inner.open_period {
                    inner.state = CircuitState::HalfOpen;
                    inner.recovery_successes = 0;
                    tracing::info!(
                        open_for_ms = elapsed.as_millis() as u64,
                        "Circuit breaker half-open, admitting trial probe"
                    );
                    (true, Some(CircuitTransition {
                        from: CircuitState::Open,
                        to: CircuitState::HalfOpen,
                    }))
                } else {
                    (false, None)
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            recovery_successes: inner.recovery_successes,
            backoff_attempt: inner.backoff_attempt,
            opened_at: inner.opened_at,
            open_period: inner.open_period,
        }
    }

    /// Time left in the open period; `None` unless Open.
    pub fn retry_after(&self) -> Option<Duration> {
        self.snapshot().retry_after()
    }

    fn open(&self, inner: &mut Inner) -> CircuitTransition {
        let from = inner.state;
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.recovery_successes = 0;
        inner.backoff_attempt += 1;

        let timeout = inner.settings.timeout;
        let open_period = if inner.backoff_attempt <= 1 {
            timeout
        } else {
            let attempt = inner.backoff_attempt - 1;
            let Inner { settings, rng, .. } = &mut *inner;
            settings.backoff.compute_delay_with(attempt, rng).max(timeout)
        };
        inner.open_period = open_period;

        tracing::warn!(
            from = %from,
            failures = inner.consecutive_failures,
            backoff_attempt = inner.backoff_attempt,
            open_period_ms = inner.open_period.as_millis() as u64,
            "Circuit breaker opened"
        );

        CircuitTransition { from, to: CircuitState::Open }
    }

    fn close(&self, inner: &mut Inner) -> CircuitTransition {
        let from = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.recovery_successes = 0;
        inner.backoff_attempt = 0;
        inner.opened_at = None;
        inner.open_period = inner.settings.timeout;

        tracing::info!(from = %from, "Circuit breaker closed");

        CircuitTransition { from, to: CircuitState::Closed }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("CircuitBreaker")
            .field("state", &snap.state)
            .field("consecutive_failures", &snap.consecutive_failures)
            .field("backoff_attempt", &snap.backoff_attempt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(failure_threshold: u32, recovery: u32) -> CircuitBreakerSettings {
        let timeout = Duration::from_secs(60);
        CircuitBreakerSettings {
            failure_threshold,
            recovery_confirmation_threshold: recovery,
            timeout,
            backoff: BackoffPolicy::new(timeout, 2.0, [0.8, 1.2], Duration::from_secs(120)),
        }
    }

    fn breaker(failure_threshold: u32, recovery: u32) -> CircuitBreaker {
        CircuitBreaker::with_rng(settings(failure_threshold, recovery), StdRng::seed_from_u64(3))
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        for n in 0..10 {
            let cb = breaker(10, 3);
            for _ in 0..n {
                assert!(cb.record_outcome(false).is_none());
            }
            assert_eq!(cb.state(), CircuitState::Closed, "{n} failures");
        }
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(10, 3);
        for _ in 0..9 {
            cb.record_outcome(false);
        }
        let transition = cb.record_outcome(false);
        assert_eq!(
            transition,
            Some(CircuitTransition { from: CircuitState::Closed, to: CircuitState::Open })
        );
        assert!(cb.is_open());
        assert_eq!(cb.snapshot().backoff_attempt, 1);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(10, 3);
        for _ in 0..9 {
            cb.record_outcome(false);
        }
        cb.record_outcome(true);

        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_gated_until_timeout() {
        let cb = breaker(1, 1);
        cb.record_outcome(false);

        assert!(!cb.allow_probe());
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cb.allow_probe());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.allow_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, 3);
        cb.record_outcome(false);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.allow_probe());

        cb.record_outcome(true);
        assert_eq!(cb.snapshot().recovery_successes, 1);

        let transition = cb.record_outcome(false);
        assert_eq!(transition.map(|t| t.to), Some(CircuitState::Open));

        let snap = cb.snapshot();
        assert_eq!(snap.recovery_successes, 0);
        assert_eq!(snap.backoff_attempt, 2);
        assert!(snap.open_period >= Duration::from_secs(60));
        assert!(snap.open_period <= Duration::from_secs(120));
        assert!(!cb.allow_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_closes_and_resets() {
        let cb = breaker(2, 2);
        cb.record_outcome(false);
        cb.record_outcome(false);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.allow_probe());

        assert!(cb.record_outcome(true).is_none());
        let transition = cb.record_outcome(true);
        assert_eq!(transition.map(|t| t.to), Some(CircuitState::Closed));

        let snap = cb.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.recovery_successes, 0);
        assert_eq!(snap.backoff_attempt, 0);
        assert!(cb.retry_after().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_counts_down() {
        let cb = breaker(1, 1);
        cb.record_outcome(false);
        assert_eq!(cb.retry_after(), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cb.retry_after(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_applied_threshold_used_by_next_failure() {
        let cb = breaker(10, 3);
        for _ in 0..3 {
            cb.record_outcome(false);
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        assert!(cb.apply(settings(2, 3)));
        assert!(!cb.apply(settings(2, 3)));
        assert_eq!(cb.settings().failure_threshold, 2);

        let transition = cb.record_outcome(false);
        assert_eq!(transition.map(|t| t.to), Some(CircuitState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_retry_after_matches_breaker() {
        let cb = breaker(1, 1);
        assert!(cb.snapshot().retry_after().is_none());

        cb.record_outcome(false);
        tokio::time::advance(Duration::from_secs(20)).await;
        let snap = cb.snapshot();
        assert_eq!(snap.retry_after(), Some(Duration::from_secs(40)));
        assert_eq!(cb.retry_after(), snap.retry_after());
    }

    #[test]
    fn test_outcomes_ignored_while_open() {
        let cb = breaker(1, 1);
        cb.record_outcome(false);
        assert!(cb.record_outcome(true).is_none());
        assert!(cb.record_outcome(false).is_none());
        assert_eq!(cb.snapshot().backoff_attempt, 1);
    }
}
