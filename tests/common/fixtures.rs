//! Seeded lineup for end-to-end tests

use super::constants::*;
use lineup_sync::document_store::{DocumentId, DocumentStore};
use lineup_sync::lineup::{import_lineup, LineupFile};
use serde_json::Value;

/// Lineup file embedded at compile time
const LINEUP_JSON: &str = include_str!("../fixtures/lineup.json");

pub fn lineup_file() -> LineupFile {
    serde_json::from_str(LINEUP_JSON).unwrap()
}

/// Imports the test lineup into an empty store.
pub async fn seed_lineup(store: &dyn DocumentStore) {
    let summary = import_lineup(store, COLLECTION, lineup_file()).await.unwrap();
    assert_eq!(summary.inserted, SEEDED_ACTS);
}

/// Store id of the act named `artist`.
pub async fn act_id(store: &dyn DocumentStore, artist: &str) -> DocumentId {
    let found = store
        .find_by_field(COLLECTION, "artist", &Value::from(artist))
        .await
        .unwrap();
    assert_eq!(found.len(), 1, "expected exactly one act named {}", artist);
    found[0].id.clone()
}

/// A rating field of `reviewer` as currently stored.
pub async fn stored_rating_field(
    store: &dyn DocumentStore,
    artist: &str,
    reviewer: &str,
    field: &str,
) -> Value {
    let found = store
        .find_by_field(COLLECTION, "artist", &Value::from(artist))
        .await
        .unwrap();
    found[0].fields["ratings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == reviewer)
        .map(|r| r[field].clone())
        .unwrap()
}
