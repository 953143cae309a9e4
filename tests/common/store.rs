//! Instrumented document store
//!
//! Wraps an [`InMemoryDocumentStore`], recording every patch and optionally
//! holding patches back until the test opens the write gate.

use async_trait::async_trait;
use lineup_sync::document_store::{
    Document, DocumentId, DocumentRef, DocumentStore, Fields, InMemoryDocumentStore, StoreError,
    Subscription,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub struct RecordingStore {
    /// The wrapped store. Writes made directly on it are not recorded.
    pub inner: Arc<InMemoryDocumentStore>,
    patches: Mutex<Vec<(DocumentRef, Fields)>>,
    gate: watch::Sender<bool>,
    refuse_subscriptions: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(InMemoryDocumentStore::new()),
            patches: Mutex::new(Vec::new()),
            gate,
            refuse_subscriptions: AtomicBool::new(false),
        }
    }

    /// Number of patches issued through this store.
    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }

    pub fn patches(&self) -> Vec<(DocumentRef, Fields)> {
        self.patches.lock().unwrap().clone()
    }

    /// Patches issued from now on wait until [`RecordingStore::open_gate`].
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.set_offline(offline);
    }

    /// Makes `subscribe` fail while reads and writes keep working.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count(super::COLLECTION)
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn bulk_read(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.inner.bulk_read(collection).await
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        if self.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("subscriptions refused".to_string()));
        }
        self.inner.subscribe(collection).await
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.find_by_field(collection, field, value).await
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        self.inner.get(doc).await
    }

    async fn patch_fields(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        self.patches
            .lock()
            .unwrap()
            .push((doc.clone(), fields.clone()));
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.inner.patch_fields(doc, fields).await
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        self.inner.insert(collection, fields).await
    }
}
