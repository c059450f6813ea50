use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

pub type SubscriptionId = u64;

/// Result of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the item into their queue.
    pub delivered: usize,
    /// Subscribers whose queue was full; the item was dropped for them only.
    pub dropped: usize,
    /// Subscribers found closed and removed during this call.
    pub pruned: usize,
}

struct Subscriber<T> {
    id: SubscriptionId,
    tx: mpsc::Sender<T>,
    /// Set while the queue is full, so a stuck subscriber is reported once.
    saturated: bool,
}

struct Registry<T> {
    next_id: SubscriptionId,
    subscribers: Vec<Subscriber<T>>,
}

/// Multicast hub: every subscriber gets its own bounded, ordered queue.
///
/// `publish` never waits. Each send is a `try_send`; a full queue drops the new item
/// for that subscriber (drop-newest) and a closed queue removes the subscriber.
/// Sends happen under the registry lock, so items published A-then-B arrive A-then-B
/// at every subscriber that receives both.
pub struct Broadcaster<T> {
    inner: Arc<Mutex<Registry<T>>>,
    capacity: usize,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> Broadcaster<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 1,
                subscribers: Vec::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push(Subscriber {
            id,
            tx,
            saturated: false,
        });
        debug!("subscription {id} registered ({} total)", registry.subscribers.len());
        Subscription { id, rx }
    }

    /// Remove a subscription explicitly. Dropping the `Subscription` has the same
    /// effect at the next `publish`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|sub| sub.id != id);
        registry.subscribers.len() != before
    }

    pub fn publish(&self, item: T) -> PublishReport {
        let mut report = PublishReport::default();
        let mut registry = self.lock();

        registry.subscribers.retain_mut(|sub| match sub.tx.try_send(item.clone()) {
            Ok(()) => {
                if sub.saturated {
                    debug!("subscription {} is draining again", sub.id);
                    sub.saturated = false;
                }
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                if sub.saturated {
                    debug!("subscription {} still full; dropping item", sub.id);
                } else {
                    warn!("subscription {} is full; dropping items until it drains", sub.id);
                    sub.saturated = true;
                }
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("subscription {} closed; removing", sub.id);
                report.pruned += 1;
                false
            }
        });

        report
    }

    /// Live subscriber count. Closed subscriptions are pruned first.
    pub fn subscriber_count(&self) -> usize {
        let mut registry = self.lock();
        registry.subscribers.retain(|sub| !sub.tx.is_closed());
        registry.subscribers.len()
    }
}

/// The consumer's end of a subscription. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next item in publish order; `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new items; already queued items can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
