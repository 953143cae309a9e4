//! Remote document store boundary.
//!
//! The sync core is built on four primitives of a remote document store: a
//! one-shot bulk read, a standing subscription that pushes the whole
//! collection on every change, a lookup by field value and an atomic
//! field-level patch. This module defines those primitives as the
//! [`DocumentStore`] trait, plus two implementations used by the binary and
//! the tests.

mod memory_store;
mod schema;
mod sqlite_document_store;
mod subscribers;

pub use memory_store::InMemoryDocumentStore;
pub use schema::DOCUMENT_VERSIONED_SCHEMAS;
pub use sqlite_document_store::SqliteDocumentStore;
pub use subscribers::SubscriberRegistry;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

/// Store-assigned opaque identifier of a document.
pub type DocumentId = String;

/// Top-level fields of a document.
pub type Fields = Map<String, Value>;

/// A document as delivered by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Reference to this document inside `collection`.
    pub fn reference(&self, collection: &str) -> DocumentRef {
        DocumentRef::new(collection, self.id.clone())
    }
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: DocumentId,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<DocumentId>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Errors reported by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {0}")]
    NotFound(DocumentRef),

    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A standing subscription to one collection.
///
/// Every item received is the complete current content of the collection.
/// The first item is delivered right after the subscription opens. Dropping
/// the subscription releases it on the store side.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Vec<Document>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a snapshot receiver. `release` runs exactly once, when the
    /// subscription is dropped.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Vec<Document>>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next full-collection snapshot.
    ///
    /// Returns `None` once the store side has gone away.
    pub async fn next_snapshot(&mut self) -> Option<Vec<Document>> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns every document of the collection.
    async fn bulk_read(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Opens a standing subscription to the collection.
    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError>;

    /// Returns the documents whose top-level `field` equals `value`.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;

    /// Returns the document at `doc`, or Ok(None) if it does not exist.
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;

    /// Atomically replaces the given top-level fields of a document, leaving
    /// the other fields untouched. Fails with [`StoreError::NotFound`] if the
    /// document does not exist.
    async fn patch_fields(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError>;

    /// Creates a new document and returns its store-assigned id.
    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError>;
}

/// Field names are restricted to identifier characters so they can be used in
/// JSON paths.
pub(crate) fn validate_field_name(field: &str) -> Result<(), StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

/// Generates a new opaque document id.
pub(crate) fn new_document_id() -> DocumentId {
    uuid::Uuid::new_v4().simple().to_string()
}
