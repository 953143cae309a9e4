//! SQLite-backed document store.
//!
//! Documents live in a single table with their body stored as a JSON object.
//! Subscriptions are served in-process: every write made through this handle
//! notifies subscribers with the full collection before it returns.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde_json::Value;
use tracing::debug;

use super::schema::DOCUMENT_VERSIONED_SCHEMAS;
use super::subscribers::SubscriberRegistry;
use super::{
    new_document_id, validate_field_name, Document, DocumentId, DocumentRef, DocumentStore,
    Fields, StoreError, Subscription,
};
use crate::sqlite_persistence::open_versioned;

pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    subscribers: SubscriberRegistry,
}

impl SqliteDocumentStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), DOCUMENT_VERSIONED_SCHEMAS, "document")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            subscribers: SubscriberRegistry::new(),
        })
    }

    fn row_to_document(id: String, fields_json: &str) -> Result<Document, StoreError> {
        let fields: Fields = serde_json::from_str(fields_json)?;
        Ok(Document::new(id, fields))
    }

    fn read_collection(conn: &Connection, collection: &str) -> Result<Vec<Document>, StoreError> {
        let mut stmt =
            conn.prepare("SELECT id, fields FROM documents WHERE collection = ?1 ORDER BY rowid")?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, fields)| Self::row_to_document(id, &fields))
            .collect()
    }

    /// Scalar values are matched in SQL; arrays and objects are compared
    /// after loading the collection.
    fn query_by_field(
        conn: &Connection,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let path = format!("$.{}", field);
        let scalar: Option<Box<dyn ToSql>> = match value {
            Value::String(s) => Some(Box::new(s.clone())),
            Value::Bool(b) => Some(Box::new(*b as i64)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Box::new(i)),
                None => n.as_f64().map(|f| Box::new(f) as Box<dyn ToSql>),
            },
            Value::Null => None,
            Value::Array(_) | Value::Object(_) => {
                return Ok(Self::read_collection(conn, collection)?
                    .into_iter()
                    .filter(|d| d.fields.get(field) == Some(value))
                    .collect());
            }
        };

        let rows = match scalar {
            Some(scalar) => {
                let mut stmt = conn.prepare(
                    "SELECT id, fields FROM documents \
                     WHERE collection = ?1 AND json_extract(fields, ?2) = ?3 ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map(params![collection, path, scalar], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, fields FROM documents \
                     WHERE collection = ?1 AND json_type(fields, ?2) = 'null' ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map(params![collection, path], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };

        rows.into_iter()
            .map(|(id, fields)| Self::row_to_document(id, &fields))
            .collect()
    }

    fn notify(&self, conn: &Connection, collection: &str) -> Result<(), StoreError> {
        if self.subscribers.subscriber_count(collection) == 0 {
            return Ok(());
        }
        let snapshot = Self::read_collection(conn, collection)?;
        let delivered = self.subscribers.notify(collection, &snapshot);
        debug!(
            "Delivered '{}' snapshot ({} documents) to {} subscribers",
            collection,
            snapshot.len(),
            delivered
        );
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn bulk_read(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::read_collection(&conn, collection)
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        let conn = self.conn.lock().unwrap();
        let current = Self::read_collection(&conn, collection)?;
        Ok(self.subscribers.register(collection, current))
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        validate_field_name(field)?;
        let conn = self.conn.lock().unwrap();
        Self::query_by_field(&conn, collection, field, value)
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let fields: Option<String> = conn
            .query_row(
                "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2",
                params![doc.collection, doc.id],
                |row| row.get(0),
            )
            .optional()?;
        fields
            .map(|fields| Self::row_to_document(doc.id.clone(), &fields))
            .transpose()
    }

    async fn patch_fields(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2",
                params![doc.collection, doc.id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(StoreError::NotFound(doc.clone()));
        };

        let mut merged: Fields = serde_json::from_str(&current)?;
        for (key, value) in fields {
            merged.insert(key, value);
        }

        tx.execute(
            "UPDATE documents SET fields = ?1, updated = cast(strftime('%s','now') as int) \
             WHERE collection = ?2 AND id = ?3",
            params![serde_json::to_string(&merged)?, doc.collection, doc.id],
        )?;
        tx.commit()?;
        debug!("Patched {}", doc);

        self.notify(&conn, &doc.collection)
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        let id = new_document_id();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO documents (id, collection, fields) VALUES (?1, ?2, ?3)",
            params![id, collection, serde_json::to_string(&fields)?],
        )?;

        self.notify(&conn, collection)?;
        Ok(id)
    }
}
