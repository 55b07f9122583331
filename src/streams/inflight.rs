//! Single-flight registry of device activations.
//!
//! At most one [`Activation`] exists per device. Joining and leaving both
//! run under the map's shard lock, so a caller can never attach to an
//! activation that the last waiter is cancelling.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::resilience::Deadline;
use crate::streams::types::{ReadinessError, ReadinessResult, Tier};

pub type Outcome = Result<ReadinessResult, ReadinessError>;

/// Extra wait past a caller's deadline for the shared result to arrive.
///
/// The activation task works to the same deadline, so its own answer
/// normally lands first and every waiter sees the same result.
pub const RESULT_GRACE: Duration = Duration::from_millis(50);

/// One device activation shared by every caller waiting on it.
#[derive(Debug)]
pub struct Activation {
    device_id: String,
    started_at: Instant,
    tier: AtomicU8,
    waiters: AtomicUsize,
    result: watch::Sender<Option<Outcome>>,
    cancel: CancellationToken,
}

impl Activation {
    fn new(device_id: &str) -> Self {
        let (result, _) = watch::channel(None);
        Self {
            device_id: device_id.to_string(),
            started_at: Instant::now(),
            tier: AtomicU8::new(Tier::Direct.as_u8()),
            waiters: AtomicUsize::new(1),
            result,
            cancel: CancellationToken::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Tier the activation is currently in.
    pub fn tier(&self) -> Tier {
        Tier::try_from(self.tier.load(Ordering::Acquire)).unwrap_or(Tier::Direct)
    }

    pub fn enter_tier(&self, tier: Tier) {
        self.tier.store(tier.as_u8(), Ordering::Release);
    }

    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Fires once nobody is waiting any more.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// How a single caller's wait ended.
#[derive(Debug)]
pub enum WaitOutcome {
    Settled(Outcome),
    Cancelled,
    Expired,
}

/// Wait for the shared result, the caller's cancellation, or its deadline.
pub async fn wait_for(activation: &Activation, deadline: &Deadline, cancel: &CancellationToken) -> WaitOutcome {
    let mut rx = activation.result.subscribe();
    let give_up_at = deadline.expires_at() + RESULT_GRACE;

    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return WaitOutcome::Settled(outcome);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
            changed = rx.changed() => {
                if changed.is_err() {
                    return WaitOutcome::Settled(Err(ReadinessError::Aborted {
                        device_id: activation.device_id.clone(),
                    }));
                }
            }
            _ = tokio::time::sleep_until(give_up_at) => return WaitOutcome::Expired,
        }
    }
}

/// A caller's attachment to an activation.
///
/// Dropping it without settling counts as leaving, so a caller whose future
/// is dropped mid-wait (e.g. a disconnected HTTP client) is not left
/// counted as a waiter.
pub struct WaiterGuard<'a> {
    map: &'a InFlightMap,
    activation: Arc<Activation>,
    cancel_on_drop: bool,
    done: bool,
}

impl<'a> WaiterGuard<'a> {
    pub fn new(map: &'a InFlightMap, activation: Arc<Activation>, cancel_on_drop: bool) -> Self {
        Self { map, activation, cancel_on_drop, done: false }
    }

    pub fn activation(&self) -> &Arc<Activation> {
        &self.activation
    }

    /// The shared result arrived; nothing to undo.
    pub fn settle(mut self) {
        self.done = true;
    }

    /// Stop waiting. Returns whether the activation was cancelled.
    pub fn leave(mut self, cancel_if_last: bool) -> bool {
        self.done = true;
        self.map.leave(&self.activation, cancel_if_last)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.map.leave(&self.activation, self.cancel_on_drop);
        }
    }
}

#[derive(Debug, Default)]
pub struct InFlightMap {
    entries: DashMap<String, Arc<Activation>>,
}

impl InFlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the device's activation, creating it if there is none.
    ///
    /// Returns `true` when the caller created it and must start the work.
    pub fn join(&self, device_id: &str) -> (Arc<Activation>, bool) {
        match self.entries.entry(device_id.to_string()) {
            Entry::Occupied(entry) => {
                let activation = entry.get().clone();
                activation.waiters.fetch_add(1, Ordering::AcqRel);
                (activation, false)
            }
            Entry::Vacant(entry) => {
                let activation = Arc::new(Activation::new(device_id));
                entry.insert(activation.clone());
                (activation, true)
            }
        }
    }

    /// A caller stops waiting without a result.
    ///
    /// When it was the last waiter and `cancel_if_last` is set, the entry is
    /// removed and the activation cancelled. Returns whether that happened.
    pub fn leave(&self, activation: &Arc<Activation>, cancel_if_last: bool) -> bool {
        let mut abandoned = false;
        self.entries.remove_if(&activation.device_id, |_, current| {
            if !Arc::ptr_eq(current, activation) {
                return false;
            }
            let remaining = activation.waiters.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
            abandoned = remaining == 0 && cancel_if_last;
            abandoned
        });

        if abandoned {
            activation.cancel.cancel();
        }
        abandoned
    }

    /// Settle an activation: unregister it, then release every waiter.
    pub fn complete(&self, activation: &Arc<Activation>, outcome: Outcome) {
        self.entries
            .remove_if(&activation.device_id, |_, current| Arc::ptr_eq(current, activation));
        activation.result.send_replace(Some(outcome));
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.entries.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::types::ReadinessStatus;

    fn ready() -> Outcome {
        Ok(ReadinessResult::ready(ReadinessStatus::Acceptable, Duration::from_secs(1), Tier::ReadyCheck))
    }

    #[tokio::test]
    async fn test_join_coalesces() {
        let map = InFlightMap::new();
        let (first, created) = map.join("cam0");
        assert!(created);
        let (second, created) = map.join("cam0");
        assert!(!created);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.waiters(), 2);
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_releases_waiters_and_unregisters() {
        let map = Arc::new(InFlightMap::new());
        let (activation, _) = map.join("cam0");
        let deadline = Deadline::after(Duration::from_secs(5));

        let waiter = {
            let activation = activation.clone();
            tokio::spawn(async move { wait_for(&activation, &deadline, &CancellationToken::new()).await })
        };

        map.complete(&activation, ready());
        assert!(!map.contains("cam0"));

        match waiter.await.unwrap() {
            WaitOutcome::Settled(outcome) => assert_eq!(outcome, ready()),
            other => panic!("unexpected {:?}", other),
        }

        // Late subscribers still see the settled value.
        let late = wait_for(&activation, &deadline, &CancellationToken::new()).await;
        assert!(matches!(late, WaitOutcome::Settled(Ok(_))));
    }

    #[tokio::test]
    async fn test_last_waiter_leaving_cancels() {
        let map = InFlightMap::new();
        let (activation, _) = map.join("cam0");
        map.join("cam0");
        let token = activation.cancellation();

        assert!(!map.leave(&activation, true));
        assert!(!token.is_cancelled());
        assert!(map.contains("cam0"));

        assert!(map.leave(&activation, true));
        assert!(token.is_cancelled());
        assert!(!map.contains("cam0"));

        let (fresh, created) = map.join("cam0");
        assert!(created);
        assert!(!Arc::ptr_eq(&fresh, &activation));
    }

    #[tokio::test]
    async fn test_dropped_guard_leaves() {
        let map = InFlightMap::new();
        let (activation, _) = map.join("cam0");
        let token = activation.cancellation();

        drop(WaiterGuard::new(&map, activation.clone(), true));
        assert!(token.is_cancelled());
        assert!(!map.contains("cam0"));
    }

    #[tokio::test]
    async fn test_settled_guard_does_nothing() {
        let map = InFlightMap::new();
        let (activation, _) = map.join("cam0");

        WaiterGuard::new(&map, activation.clone(), true).settle();
        assert_eq!(activation.waiters(), 1);
        assert!(map.contains("cam0"));
    }

    #[tokio::test]
    async fn test_leave_without_cancel_keeps_running() {
        let map = InFlightMap::new();
        let (activation, _) = map.join("cam0");

        assert!(!map.leave(&activation, false));
        assert!(!activation.cancellation().is_cancelled());
        assert!(map.contains("cam0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_expires_after_grace() {
        let map = InFlightMap::new();
        let (activation, _) = map.join("cam0");
        let deadline = Deadline::after(Duration::from_secs(1));

        let started = Instant::now();
        let outcome = wait_for(&activation, &deadline, &CancellationToken::new()).await;
        assert!(matches!(outcome, WaitOutcome::Expired));
        assert_eq!(started.elapsed(), Duration::from_secs(1) + RESULT_GRACE);
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let map = InFlightMap::new();
        let (activation, _) = map.join("cam0");
        let deadline = Deadline::after(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = wait_for(&activation, &deadline, &cancel).await;
        assert!(matches!(outcome, WaitOutcome::Cancelled));
    }
}
