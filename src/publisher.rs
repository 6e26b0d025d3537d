// In-process fan-out: one producer, a handful of long-lived subscribers.
// One Publisher per stream (power, weather), shared by Arc between the poller
// that feeds it and the components that subscribe to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// How `publish` hands a value to each subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Await each subscriber's single-slot channel in turn. Per-subscriber
    /// order is preserved; a subscriber that stops reading stalls the publisher.
    #[default]
    Blocking,
    /// Spawn one task per delivery. The publisher never waits, but ordering
    /// between consecutive publishes is not guaranteed and a stalled
    /// subscriber accumulates pending tasks.
    Detached,
    /// Queue up to `capacity` values per subscriber; values that do not fit
    /// are dropped for that subscriber only.
    Buffered { capacity: usize },
}

/// Receiving end handed out by [`Publisher::subscribe`].
/// Dropping it is enough to leave; the next publish prunes the closed channel.
#[derive(Debug)]
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next published value. `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

pub struct Publisher<T> {
    policy: DeliveryPolicy,
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, mpsc::Sender<T>>>,
    dropped_total: AtomicU64,
}

impl<T> Default for Publisher<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DeliveryPolicy::default())
    }
}

impl<T> Publisher<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            policy,
            next_id: AtomicU64::new(0),
            subscribers: RwLock::new(HashMap::new()),
            dropped_total: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let capacity = match self.policy {
            DeliveryPolicy::Buffered { capacity } => capacity.max(1),
            DeliveryPolicy::Blocking | DeliveryPolicy::Detached => 1,
        };
        let (tx, rx) = mpsc::channel(capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        tracing::debug!(subscriber = id, "subscribed");
        Subscription { id, rx }
    }

    /// Safe to call with undrained or already removed subscriptions.
    pub fn unsubscribe(&self, subscription: &Subscription<T>) {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription.id)
            .is_some();
        if removed {
            tracing::debug!(subscriber = subscription.id, "unsubscribed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Values dropped by the `Buffered` policy because a subscriber queue was full.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Deliver `value` to every current subscriber according to the policy.
    pub async fn publish(&self, value: T) {
        // Senders are cloned out so the lock is never held across an await.
        let targets: Vec<(u64, mpsc::Sender<T>)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut closed = Vec::new();
        match self.policy {
            DeliveryPolicy::Blocking => {
                for (id, tx) in targets {
                    if tx.send(value.clone()).await.is_err() {
                        closed.push(id);
                    }
                }
            }
            DeliveryPolicy::Detached => {
                for (id, tx) in targets {
                    if tx.is_closed() {
                        closed.push(id);
                        continue;
                    }
                    let value = value.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(value).await;
                    });
                }
            }
            DeliveryPolicy::Buffered { .. } => {
                for (id, tx) in targets {
                    match tx.try_send(value.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            self.dropped_total.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(subscriber = id, "subscriber queue full; value dropped");
                        }
                        Err(TrySendError::Closed(_)) => closed.push(id),
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in closed {
                subscribers.remove(&id);
                tracing::debug!(subscriber = id, "pruned closed subscriber");
            }
        }
    }
}
