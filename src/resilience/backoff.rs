//! Exponential backoff with jitter.
//!
//! `delay = min(max, base * multiplier^attempt * jitter)` where `jitter` is
//! drawn uniformly from the configured range.

use std::time::Duration;
use rand::Rng;

use crate::config::MediaMtxConfig;

/// Exponent ceiling; `multiplier^64` is already far past any sane cap.
const MAX_EXPONENT: u32 = 64;

/// Jittered, capped exponential backoff.
///
/// The policy itself holds no attempt counter; callers own theirs.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    multiplier: f64,
    jitter_min: f64,
    jitter_max: f64,
    max_delay: Duration,
}

impl BackoffPolicy {
    /// Create a policy. Bounds are assumed to have passed config validation.
    pub fn new(base: Duration, multiplier: f64, jitter_range: [f64; 2], max_delay: Duration) -> Self {
        Self {
            base,
            multiplier,
            jitter_min: jitter_range[0],
            jitter_max: jitter_range[1],
            max_delay,
        }
    }

    /// Policy using the MediaMTX multiplier/jitter/ceiling with a custom base.
    pub fn from_mediamtx(config: &MediaMtxConfig, base: Duration) -> Self {
        Self::new(
            base,
            config.backoff_base_multiplier,
            config.backoff_jitter_range,
            config.health_max_backoff_interval(),
        )
    }

    /// Return a copy with a different base delay.
    pub fn with_base(&self, base: Duration) -> Self {
        Self { base, ..self.clone() }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Un-jittered delay for `attempt`: `base * multiplier^attempt`, uncapped.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_EXPONENT) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        secs_to_duration(secs)
    }

    /// Compute the delay for `attempt` using the thread-local RNG.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        self.compute_delay_with(attempt, &mut rand::thread_rng())
    }

    /// Compute the delay for `attempt` drawing jitter from `rng`.
    pub fn compute_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let raw = self.raw_delay(attempt).min(self.max_delay);

        let jitter = if self.jitter_max > self.jitter_min {
            rng.gen_range(self.jitter_min..=self.jitter_max)
        } else {
            self.jitter_min
        };

        secs_to_duration(raw.as_secs_f64() * jitter).min(self.max_delay)
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs >= Duration::MAX.as_secs_f64() {
        return Duration::MAX;
    }
    Duration::from_secs_f64(secs.max(0.0))
}
