//! Live snapshot synchronizer.
//!
//! Owns the canonical in-memory copy of the collection. It is seeded by one
//! bulk read and then kept current by a standing subscription; each delivery
//! replaces the whole collection. Readers observe it through a
//! `tokio::sync::watch` channel, so they wake up only when it changes.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::optimistic::apply_rating_patch;
use super::pending::PendingWrites;
use super::snapshot::{LineupSnapshot, SyncState};
use super::ReconcilePolicy;
use crate::document_store::{Document, DocumentStore, Subscription};
use crate::lineup::RatingPatch;

pub struct LineupSynchronizer {
    store: Arc<dyn DocumentStore>,
    collection: String,
    state: Arc<watch::Sender<Arc<SyncState>>>,
    pending: Option<Arc<PendingWrites>>,
    shutdown: CancellationToken,
    subscription_task: Mutex<Option<JoinHandle<()>>>,
}

impl LineupSynchronizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        policy: ReconcilePolicy,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(SyncState::default()));
        let pending = match policy {
            ReconcilePolicy::LocalEcho => None,
            ReconcilePolicy::TrackPending => Some(Arc::new(PendingWrites::new())),
        };
        Self {
            store,
            collection: collection.into(),
            state: Arc::new(state),
            pending,
            shutdown,
            subscription_task: Mutex::new(None),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// A receiver that is notified on every change of the published state.
    pub fn watch(&self) -> watch::Receiver<Arc<SyncState>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> Arc<SyncState> {
        self.state.borrow().clone()
    }

    pub fn snapshot(&self) -> LineupSnapshot {
        self.state.borrow().snapshot.clone()
    }

    /// The pending-write set, present under [`ReconcilePolicy::TrackPending`].
    pub fn pending(&self) -> Option<&Arc<PendingWrites>> {
        self.pending.as_ref()
    }

    /// Loads the collection and opens the standing subscription.
    ///
    /// Returns the best-effort starting snapshot from the bulk read. The state
    /// stays `loading` until the subscription delivers. If the bulk read or
    /// the subscription fails, the state is published as an empty, non-loading
    /// collection and no subscription is kept.
    pub async fn initialize(&self) -> LineupSnapshot {
        if self.subscription_task.lock().unwrap().is_some() {
            warn!("Synchronizer for '{}' is already initialized", self.collection);
            return self.snapshot();
        }

        info!("Loading collection '{}'...", self.collection);
        let initial = match self.store.bulk_read(&self.collection).await {
            Ok(documents) => LineupSnapshot::from_documents(&documents),
            Err(e) => {
                warn!("Failed to load collection '{}': {}", self.collection, e);
                self.publish_failure();
                return self.snapshot();
            }
        };
        info!("Loaded {} acts from '{}'", initial.len(), self.collection);
        self.state.send_modify(|state| {
            *state = Arc::new(SyncState {
                snapshot: initial.clone(),
                ..SyncState::clone(state)
            });
        });

        let subscription = match self.store.subscribe(&self.collection).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Failed to subscribe to '{}': {}", self.collection, e);
                self.publish_failure();
                return initial;
            }
        };
        debug!("Subscribed to '{}'", self.collection);

        let task = tokio::spawn(run_subscription(
            subscription,
            self.state.clone(),
            self.pending.clone(),
            self.collection.clone(),
            self.shutdown.clone(),
        ));
        *self.subscription_task.lock().unwrap() = Some(task);
        initial
    }

    /// Waits until loading is over, either because the first delivery arrived
    /// or because loading failed. Returns early on shutdown.
    pub async fn ready(&self) -> Arc<SyncState> {
        let mut receiver = self.state.subscribe();
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = receiver.wait_for(|state| !state.loading) => {}
        }
        self.state()
    }

    /// Applies an optimistic patch to the published snapshot. Returns false if
    /// nothing changed.
    pub fn apply_patch(&self, act_id: &str, reviewer: &str, patch: &RatingPatch) -> bool {
        self.state.send_if_modified(|state| {
            let patched = apply_rating_patch(&state.snapshot, act_id, reviewer, patch);
            if patched.same_as(&state.snapshot) {
                return false;
            }
            *state = Arc::new(SyncState {
                snapshot: patched,
                ..SyncState::clone(state)
            });
            true
        })
    }

    /// Cancels the subscription and waits for it to be released.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.subscription_task.lock().unwrap().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Subscription task for '{}' ended abnormally: {}", self.collection, e);
            }
        }
    }

    fn publish_failure(&self) {
        self.state.send_modify(|state| {
            *state = Arc::new(SyncState {
                snapshot: LineupSnapshot::default(),
                loading: false,
                deliveries: state.deliveries,
            });
        });
    }
}

impl Drop for LineupSynchronizer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_subscription(
    mut subscription: Subscription,
    state: Arc<watch::Sender<Arc<SyncState>>>,
    pending: Option<Arc<PendingWrites>>,
    collection: String,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Releasing subscription to '{}'", collection);
                break;
            }
            delivery = subscription.next_snapshot() => match delivery {
                Some(documents) => apply_delivery(&state, pending.as_deref(), &collection, &documents),
                None => {
                    warn!("Subscription to '{}' was closed by the store", collection);
                    state.send_if_modified(|current| {
                        if !current.loading {
                            return false;
                        }
                        *current = Arc::new(SyncState {
                            loading: false,
                            ..SyncState::clone(current)
                        });
                        true
                    });
                    break;
                }
            }
        }
    }
}

fn apply_delivery(
    state: &watch::Sender<Arc<SyncState>>,
    pending: Option<&PendingWrites>,
    collection: &str,
    documents: &[Document],
) {
    let incoming = LineupSnapshot::from_documents(documents);

    // Overlaid under the state lock: an edit registers its pending entry
    // before publishing, so it is either in the overlay or applied after.
    state.send_modify(|current| {
        let snapshot = match pending {
            Some(pending) => pending.overlay(incoming),
            None => incoming,
        };
        if current.loading {
            info!(
                "First snapshot of '{}' delivered ({} acts)",
                collection,
                snapshot.len()
            );
        } else {
            debug!("Snapshot of '{}' delivered ({} acts)", collection, snapshot.len());
        }
        *current = Arc::new(SyncState {
            snapshot,
            loading: false,
            deliveries: current.deliveries + 1,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{DocumentRef, Fields, InMemoryDocumentStore};
    use crate::lineup::ScoreField;
    use serde_json::{json, Value};

    fn act_fields(artist: &str) -> Fields {
        json!({
            "artist": artist,
            "genre": ["folk"],
            "desc": "",
            "day": "Friday",
            "ratings": [{"name": "alice", "like": null, "notes": "", "rowdy": null}]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    async fn seeded_store(artists: &[&str]) -> (Arc<InMemoryDocumentStore>, Vec<String>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let mut ids = Vec::new();
        for artist in artists {
            ids.push(store.insert("lineup", act_fields(artist)).await.unwrap());
        }
        (store, ids)
    }

    fn synchronizer(store: Arc<InMemoryDocumentStore>, policy: ReconcilePolicy) -> LineupSynchronizer {
        LineupSynchronizer::new(store, "lineup", policy, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_initialize_loads_and_becomes_ready() {
        let (store, _) = seeded_store(&["Zed", "abe"]).await;
        let sync = synchronizer(store, ReconcilePolicy::LocalEcho);

        let initial = sync.initialize().await;
        assert_eq!(initial.len(), 2);

        let state = sync.ready().await;
        assert!(!state.loading);
        assert_eq!(state.deliveries, 1);
        let names: Vec<_> = state.snapshot.acts().iter().map(|a| a.artist.clone()).collect();
        assert_eq!(names, vec!["abe", "Zed"]);
    }

    #[tokio::test]
    async fn test_bulk_read_failure_clears_loading() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.set_offline(true);
        let sync = synchronizer(store.clone(), ReconcilePolicy::LocalEcho);

        let initial = sync.initialize().await;
        assert!(initial.is_empty());
        let state = sync.ready().await;
        assert!(!state.loading);
        assert!(state.snapshot.is_empty());
        assert_eq!(store.subscriber_count("lineup"), 0);
    }

    #[tokio::test]
    async fn test_delivery_replaces_whole_collection() {
        let (store, ids) = seeded_store(&["A", "B"]).await;
        let sync = synchronizer(store.clone(), ReconcilePolicy::LocalEcho);
        sync.initialize().await;
        sync.ready().await;

        let mut rx = sync.watch();
        rx.borrow_and_update();
        store.remove(&DocumentRef::new("lineup", ids[0].clone()));
        rx.changed().await.unwrap();

        let state = sync.state();
        let remaining: Vec<_> = state.snapshot.ids().into_iter().collect();
        assert_eq!(remaining, vec![ids[1].as_str()]);
    }

    #[tokio::test]
    async fn test_apply_patch_updates_published_snapshot() {
        let (store, ids) = seeded_store(&["A"]).await;
        let sync = synchronizer(store, ReconcilePolicy::LocalEcho);
        sync.initialize().await;
        sync.ready().await;

        let patch = RatingPatch::score(ScoreField::Like, Some(4)).unwrap();
        assert!(sync.apply_patch(&ids[0], "alice", &patch));
        assert!(!sync.apply_patch(&ids[0], "alice", &patch));

        let snapshot = sync.snapshot();
        assert_eq!(
            snapshot.find(&ids[0]).unwrap().rating("alice").unwrap().like,
            Some(4)
        );
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscription() {
        let (store, _) = seeded_store(&["A"]).await;
        let sync = synchronizer(store.clone(), ReconcilePolicy::LocalEcho);
        sync.initialize().await;
        sync.ready().await;
        assert_eq!(store.subscriber_count("lineup"), 1);

        sync.shutdown().await;
        assert_eq!(store.subscriber_count("lineup"), 0);
    }

    #[tokio::test]
    async fn test_track_pending_masks_stale_delivery() {
        let (store, ids) = seeded_store(&["A", "B"]).await;
        let sync = synchronizer(store.clone(), ReconcilePolicy::TrackPending);
        sync.initialize().await;
        sync.ready().await;

        let patch = RatingPatch::score(ScoreField::Rowdy, Some(5)).unwrap();
        sync.apply_patch(&ids[0], "alice", &patch);
        sync.pending().unwrap().register(&ids[0], "alice", &patch);

        // An unrelated write produces a snapshot that does not carry the edit yet.
        let mut rx = sync.watch();
        rx.borrow_and_update();
        let mut desc = Fields::new();
        desc.insert("desc".to_string(), Value::from("updated"));
        store
            .patch_fields(&DocumentRef::new("lineup", ids[1].clone()), desc)
            .await
            .unwrap();
        rx.changed().await.unwrap();

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.find(&ids[1]).unwrap().desc, "updated");
        assert_eq!(
            snapshot.find(&ids[0]).unwrap().rating("alice").unwrap().rowdy,
            Some(5)
        );
        assert_eq!(sync.pending().unwrap().len(), 1);
    }
}
