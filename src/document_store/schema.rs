//! SQLite schema for the document store database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 1 - Documents
// =============================================================================

/// One row per document; `fields` holds the document body as a JSON object.
const DOCUMENTS_TABLE_V1: Table = Table {
    name: "documents",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("collection", &SqlType::Text, non_null = true),
        sqlite_column!("fields", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_documents_collection", "collection, created")],
};

pub const DOCUMENT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[DOCUMENTS_TABLE_V1],
    migration: None,
}];
