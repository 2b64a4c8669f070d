//! Distributes snapshots to an arbitrary number of subscribers.
//!
//! Each subscriber owns a single-slot delivery queue (a `watch` channel). A
//! publish overwrites whatever the subscriber has not yet read, so a slow
//! subscriber skips intermediate snapshots but always converges on the latest
//! one, and it can never stall the publisher or other subscribers.

use crate::snapshot::Snapshot;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;

pub type SharedHub = Arc<Hub>;

#[derive(Debug)]
pub struct Hub {
    registry: Mutex<Registry>,
}

#[derive(Debug)]
struct Registry {
    next_id: u64,
    current: Arc<Snapshot>,
    subscribers: HashMap<u64, Arc<watch::Sender<Arc<Snapshot>>>>,
    publishes: u64,
}

/// A registered subscriber. Dropping it unregisters it from the hub.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    current: Arc<Snapshot>,
    rx: watch::Receiver<Arc<Snapshot>>,
    hub: SharedHub,
}

// === impl Hub ===

impl Hub {
    pub fn shared() -> SharedHub {
        Arc::new(Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                current: Arc::new(Snapshot::default()),
                subscribers: HashMap::new(),
                publishes: 0,
            }),
        })
    }

    /// Registers a new subscriber and returns it along with the hub's current
    /// snapshot.
    ///
    /// The current snapshot is read under the same lock that registers the
    /// subscriber, so every later publish reaches it.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;

        let current = registry.current.clone();
        let (tx, rx) = watch::channel(current.clone());
        registry.subscribers.insert(id, Arc::new(tx));
        tracing::debug!(id, subscribers = registry.subscribers.len(), "Subscribed");

        Subscription {
            id,
            current,
            rx,
            hub: self.clone(),
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut registry = self.registry.lock();
        if registry.subscribers.remove(&id).is_some() {
            tracing::debug!(id, subscribers = registry.subscribers.len(), "Unsubscribed");
        }
    }

    /// Makes `snapshot` current and offers it to every subscriber.
    ///
    /// Returns false without notifying anyone when the snapshot's version
    /// matches the current one. Publishing is expected to be driven by a
    /// single task.
    pub fn publish(&self, snapshot: Snapshot) -> bool {
        let snapshot = Arc::new(snapshot);
        let subscribers = {
            let mut registry = self.registry.lock();
            if registry.current.version == snapshot.version {
                return false;
            }
            registry.current = snapshot.clone();
            registry.publishes += 1;
            registry.subscribers.values().cloned().collect::<Vec<_>>()
        };

        // Deliveries replace any unread value and never wait on the receiver.
        for tx in subscribers {
            tx.send_replace(snapshot.clone());
        }
        true
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.registry.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// The number of publishes that changed the current snapshot.
    pub fn publish_count(&self) -> u64 {
        self.registry.lock().publishes
    }
}

// === impl Subscription ===

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The hub's current snapshot at the time of subscription. It is empty if
    /// nothing had been published yet.
    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    /// Waits for the next delivery.
    ///
    /// Returns `None` once the subscriber has been removed from the hub.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests;
