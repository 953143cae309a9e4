//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestLineup, ALICE, EXAMPLE_BAND};
//!
//! #[tokio::test]
//! async fn test_rate() {
//!     let lineup = TestLineup::seed().await;
//!     let session = lineup.open_session().await;
//!     let id = lineup.id_of(EXAMPLE_BAND).await;
//!     session.set_score(&id, ALICE, ScoreField::Like, Some(4)).unwrap();
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fixtures;
mod store;

pub use constants::*;
pub use fixtures::{act_id, lineup_file, seed_lineup, stored_rating_field};
pub use store::RecordingStore;

use lineup_sync::document_store::{DocumentId, DocumentStore};
use lineup_sync::sync::{LineupSession, SessionConfig, SyncState};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// A seeded in-memory lineup behind a [`RecordingStore`].
pub struct TestLineup {
    pub store: Arc<RecordingStore>,
}

impl TestLineup {
    pub async fn seed() -> Self {
        let store = Arc::new(RecordingStore::new());
        seed_lineup(store.as_ref()).await;
        Self { store }
    }

    pub async fn open_session(&self) -> LineupSession {
        self.open_session_with(SessionConfig::default()).await
    }

    /// Opens a session and waits for its first delivery.
    pub async fn open_session_with(&self, config: SessionConfig) -> LineupSession {
        let session = LineupSession::open(self.store.clone(), config).await;
        let state = session.ready().await;
        assert!(!state.loading);
        session
    }

    pub async fn id_of(&self, artist: &str) -> DocumentId {
        act_id(self.store.as_ref(), artist).await
    }

    pub async fn stored(&self, artist: &str, reviewer: &str, field: &str) -> Value {
        stored_rating_field(self.store.as_ref(), artist, reviewer, field).await
    }

    /// Changes the description of `artist` directly in the store, producing a
    /// delivery unrelated to any rating.
    pub async fn touch(&self, artist: &str) {
        let id = self.id_of(artist).await;
        let mut fields = lineup_sync::document_store::Fields::new();
        fields.insert("desc".to_string(), Value::from("touched"));
        self.store
            .inner
            .patch_fields(
                &lineup_sync::document_store::DocumentRef::new(COLLECTION, id),
                fields,
            )
            .await
            .unwrap();
    }
}

/// Waits until the session has applied at least `count` deliveries.
pub async fn wait_for_deliveries(
    receiver: &mut watch::Receiver<Arc<SyncState>>,
    count: u64,
) -> Arc<SyncState> {
    receiver
        .wait_for(|state| state.deliveries >= count)
        .await
        .unwrap()
        .clone()
}
