//! Subscriber bookkeeping shared by the store implementations.
//!
//! Tracks open subscriptions by collection and fans out full-collection
//! snapshots to them. Subscriptions unregister themselves when dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use super::{Document, Subscription};

struct SubscriberEntry {
    collection: String,
    sender: mpsc::UnboundedSender<Vec<Document>>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    entries: HashMap<u64, SubscriberEntry>,
}

/// Fans out collection snapshots to open subscriptions.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber on `collection` and queue `initial` as its first
    /// delivery.
    pub fn register(&self, collection: &str, initial: Vec<Document>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is still held here, so this cannot fail.
        let _ = tx.send(initial);

        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.insert(
                id,
                SubscriberEntry {
                    collection: collection.to_string(),
                    sender: tx,
                },
            );
            id
        };
        debug!("Subscriber {} registered on '{}'", id, collection);

        let registry = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = registry.upgrade() {
                inner.lock().unwrap().entries.remove(&id);
                debug!("Subscriber {} released", id);
            }
        })
    }

    /// Push `snapshot` to every subscriber of `collection`.
    ///
    /// Subscribers whose receiving side is gone are dropped. Returns the
    /// number of subscribers that received the snapshot.
    pub fn notify(&self, collection: &str, snapshot: &[Document]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut closed = Vec::new();
        let mut delivered = 0;

        for (id, entry) in inner.entries.iter() {
            if entry.collection != collection {
                continue;
            }
            if entry.sender.send(snapshot.to_vec()).is_err() {
                closed.push(*id);
            } else {
                delivered += 1;
            }
        }

        for id in closed {
            inner.entries.remove(&id);
        }
        delivered
    }

    /// Number of open subscriptions on `collection`.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|entry| entry.collection == collection)
            .count()
    }
}
