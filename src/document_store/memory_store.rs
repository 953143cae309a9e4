//! In-memory document store.
//!
//! Keeps every collection in a mutex-guarded map and notifies subscribers
//! before a write returns, so subscribers always observe their own writes.
//! Can be switched offline to exercise the degraded paths of the sync core.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::subscribers::SubscriberRegistry;
use super::{
    new_document_id, validate_field_name, Document, DocumentId, DocumentRef, DocumentStore,
    Fields, StoreError, Subscription,
};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    /// collection -> documents in insertion order
    collections: Mutex<HashMap<String, Vec<Document>>>,
    subscribers: SubscriberRegistry,
    offline: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When offline every operation fails with [`StoreError::Unavailable`].
    /// Open subscriptions stay open but receive nothing.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of open subscriptions on `collection`.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.subscribers.subscriber_count(collection)
    }

    /// Removes a document, notifying subscribers. Returns whether it existed.
    pub fn remove(&self, doc: &DocumentRef) -> bool {
        let mut collections = self.collections.lock().unwrap();
        let Some(documents) = collections.get_mut(&doc.collection) else {
            return false;
        };
        let before = documents.len();
        documents.retain(|d| d.id != doc.id);
        let removed = documents.len() != before;
        if removed {
            self.subscribers.notify(&doc.collection, documents);
        }
        removed
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn bulk_read(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check_online()?;
        let collections = self.collections.lock().unwrap();
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        self.check_online()?;
        let collections = self.collections.lock().unwrap();
        let current = collections.get(collection).cloned().unwrap_or_default();
        Ok(self.subscribers.register(collection, current))
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_online()?;
        validate_field_name(field)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|d| d.fields.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        self.check_online()?;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(&doc.collection)
            .and_then(|documents| documents.iter().find(|d| d.id == doc.id))
            .cloned())
    }

    async fn patch_fields(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        self.check_online()?;
        let mut collections = self.collections.lock().unwrap();
        let documents = collections
            .get_mut(&doc.collection)
            .ok_or_else(|| StoreError::NotFound(doc.clone()))?;
        let target = documents
            .iter_mut()
            .find(|d| d.id == doc.id)
            .ok_or_else(|| StoreError::NotFound(doc.clone()))?;

        for (key, value) in fields {
            target.fields.insert(key, value);
        }
        debug!("Patched {}", doc);

        self.subscribers.notify(&doc.collection, documents);
        Ok(())
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        self.check_online()?;
        let id = new_document_id();
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        documents.push(Document::new(id.clone(), fields));

        self.subscribers.notify(collection, documents);
        Ok(id)
    }
}
