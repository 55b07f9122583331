//! Deadline enforcement.
//!
//! A [`Deadline`] is fixed when an operation starts; every wait inside the
//! operation is capped by what is left of it.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};

/// Absolute deadline for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started_at: Instant,
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    pub fn starting_at(started_at: Instant, budget: Duration) -> Self {
        let expires_at = started_at
            .checked_add(budget)
            .unwrap_or_else(|| started_at + Duration::from_secs(86_400 * 365));
        Self { started_at, expires_at }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn budget(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.started_at)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// `wait` shortened to fit in the remaining budget.
    pub fn cap(&self, wait: Duration) -> Duration {
        wait.min(self.remaining())
    }

    /// A sub-deadline ending after `budget` or at this deadline, whichever is first.
    pub fn child(&self, budget: Duration) -> Deadline {
        let now = Instant::now();
        let child = Deadline::starting_at(now, budget);
        Deadline {
            started_at: now,
            expires_at: child.expires_at.min(self.expires_at),
        }
    }

    /// Run `future` until it completes or the deadline passes.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, time::error::Elapsed> {
        time::timeout_at(self.expires_at, future).await
    }

    /// Sleep for `wait`, never past the deadline.
    pub async fn sleep(&self, wait: Duration) {
        time::sleep(self.cap(wait)).await;
    }
}
