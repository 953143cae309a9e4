//! Lineup import.
//!
//! Seeds an empty collection from a lineup file of the form
//! `{"lineup": [{"artist": ..., "genre": [...], "desc": ..., "day": ..., "ratings": [...]}]}`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use super::models::ActRecord;
use crate::document_store::{DocumentStore, Fields};

#[derive(Debug, Deserialize)]
pub struct LineupFile {
    pub lineup: Vec<ActRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub failed: usize,
    /// The collection already held data, nothing was imported.
    pub skipped: bool,
}

impl LineupFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lineup file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse lineup file: {:?}", path))
    }
}

/// Inserts every act of `file` into `collection`, unless the collection
/// already has documents. A failed insert is logged and the import goes on.
pub async fn import_lineup(
    store: &dyn DocumentStore,
    collection: &str,
    file: LineupFile,
) -> Result<ImportSummary> {
    let existing = store
        .bulk_read(collection)
        .await
        .with_context(|| format!("Failed to read collection '{}'", collection))?;
    if !existing.is_empty() {
        info!(
            "Collection '{}' already has {} acts, skipping import",
            collection,
            existing.len()
        );
        return Ok(ImportSummary {
            skipped: true,
            ..Default::default()
        });
    }

    info!("Importing {} acts into '{}'...", file.lineup.len(), collection);
    let now = chrono::Utc::now().to_rfc3339();
    let mut summary = ImportSummary::default();

    for act in file.lineup {
        let artist = act.artist.clone();
        let mut fields = match serde_json::to_value(&act)? {
            Value::Object(fields) => fields,
            _ => Fields::new(),
        };
        fields.insert("createdAt".to_string(), Value::from(now.clone()));
        fields.insert("updatedAt".to_string(), Value::from(now.clone()));

        match store.insert(collection, fields).await {
            Ok(_) => summary.inserted += 1,
            Err(e) => {
                error!("Error adding act {}: {}", artist, e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Imported {} acts into '{}' ({} failed)",
        summary.inserted, collection, summary.failed
    );
    Ok(summary)
}
