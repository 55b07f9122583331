//! Bounded event bus with panic-isolated subscribers.
//!
//! Publishing never blocks: the bus is a `broadcast` channel, and a
//! subscriber that falls behind loses the oldest events instead of stalling
//! the publisher. Each subscriber runs in its own task and every handler call
//! is wrapped in `catch_unwind`, so a panicking handler is logged and the
//! subscriber keeps going.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::events::types::ServiceEvent;
use crate::observability::metrics;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServiceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to current subscribers. Returns how many will see it.
    pub fn publish(&self, event: ServiceEvent) -> usize {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(kind, "Event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `handler` for every event in a dedicated task.
    ///
    /// The task ends once every `EventBus` clone has been dropped.
    pub fn spawn_subscriber<F>(&self, name: &'static str, handler: F) -> JoinHandle<()>
    where
        F: Fn(&ServiceEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
                        if let Err(payload) = outcome {
                            tracing::error!(
                                subscriber = name,
                                kind = event.kind(),
                                panic = %panic_message(payload.as_ref()),
                                "Event subscriber panicked; recovered"
                            );
                            metrics::record_subscriber_panic(name);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(subscriber = name, skipped, "Event subscriber lagging, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!(subscriber = name, "Event subscriber stopped");
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn reload(generation: u64) -> ServiceEvent {
        ServiceEvent::ConfigReloaded { generation, source: "test".into() }
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let after_panic = Arc::new(AtomicUsize::new(0));

        let s = seen.clone();
        let healthy = bus.spawn_subscriber("healthy", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let a = after_panic.clone();
        let flaky = bus.spawn_subscriber("flaky", move |event| {
            if let ServiceEvent::ConfigReloaded { generation: 1, .. } = event {
                panic!("boom");
            }
            a.fetch_add(1, Ordering::SeqCst);
        });

        for generation in 1..=3 {
            bus.publish(reload(generation));
        }
        drop(bus);

        tokio::time::timeout(Duration::from_secs(5), healthy).await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(5), flaky).await.unwrap().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(after_panic.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(reload(1)), 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(reload(2)), 1);
        assert_eq!(rx.recv().await.unwrap(), reload(2));
    }
}
