//! Retry logic.
//!
//! Retries transient failures with jittered backoff, each attempt capped by
//! a per-attempt timeout and the whole sequence by the caller's [`Deadline`].
//! `max_retries` counts retries, so an operation runs at most
//! `max_retries + 1` times.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::timeouts::Deadline;

/// Errors that know whether another attempt could help.
pub trait RetryableError: fmt::Display {
    fn is_transient(&self) -> bool;

    /// Error for an attempt cut off after `after`.
    fn timed_out(after: Duration) -> Self;
}

/// How an operation is retried.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    pub backoff: BackoffPolicy,
    pub max_retries: u32,
    pub attempt_timeout: Duration,
}

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("deadline reached after {attempts} attempts")]
    DeadlineExceeded { attempts: u32, last: Option<E> },

    #[error("permanent failure: {0}")]
    Permanent(E),
}

impl<E: fmt::Display> RetryError<E> {
    pub fn is_deadline(&self) -> bool {
        matches!(self, RetryError::DeadlineExceeded { .. })
    }
}

/// Run `f` until it succeeds, fails permanently, runs out of retries, or
/// the deadline passes. `f` receives the zero-based attempt number.
pub async fn with_retry<T, E, F, Fut>(
    schedule: &RetrySchedule,
    deadline: &Deadline,
    operation: &str,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    E: RetryableError,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0u32;
    let mut last = None;

    loop {
        if deadline.is_expired() {
            return Err(RetryError::DeadlineExceeded { attempts, last });
        }

        let budget = deadline.cap(schedule.attempt_timeout);
        let result = match tokio::time::timeout(budget, f(attempts)).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(budget)),
        };
        attempts += 1;

        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
            Err(e) => e,
        };

        if attempts > schedule.max_retries {
            tracing::debug!(operation, attempts, error = %error, "Retry attempts exhausted");
            return Err(RetryError::Exhausted { attempts, last: error });
        }

        let delay = schedule.backoff.compute_delay(attempts - 1);
        if delay >= deadline.remaining() {
            tracing::debug!(operation, attempts, error = %error, "No budget left for another attempt");
            return Err(RetryError::DeadlineExceeded { attempts, last: Some(error) });
        }

        tracing::debug!(
            operation,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        last = Some(error);
    }
}
