//! The in-memory copy of the lineup collection.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::document_store::Document;
use crate::lineup::Act;

/// Ordered, immutable view of the collection, sorted by artist name
/// (case-insensitive).
///
/// Cloning is cheap and clones share their storage, which lets consumers
/// detect an unchanged snapshot with [`LineupSnapshot::same_as`] instead of
/// comparing contents.
#[derive(Debug, Clone, Default)]
pub struct LineupSnapshot {
    acts: Arc<Vec<Arc<Act>>>,
}

impl LineupSnapshot {
    pub fn from_acts(acts: Vec<Act>) -> Self {
        Self::sorted(acts.into_iter().map(Arc::new).collect())
    }

    /// Decodes a store payload. Documents that are not valid acts are logged
    /// and left out.
    pub fn from_documents(documents: &[Document]) -> Self {
        let acts = documents
            .iter()
            .filter_map(|doc| match Act::from_document(doc) {
                Ok(act) => Some(Arc::new(act)),
                Err(e) => {
                    warn!("Skipping lineup document: {}", e);
                    None
                }
            })
            .collect();
        Self::sorted(acts)
    }

    fn sorted(mut acts: Vec<Arc<Act>>) -> Self {
        acts.sort_by(|a, b| a.artist.to_lowercase().cmp(&b.artist.to_lowercase()));
        Self {
            acts: Arc::new(acts),
        }
    }

    /// Builds a snapshot from acts that are already in order.
    pub(crate) fn from_ordered(acts: Vec<Arc<Act>>) -> Self {
        Self {
            acts: Arc::new(acts),
        }
    }

    pub fn acts(&self) -> &[Arc<Act>] {
        &self.acts
    }

    pub fn len(&self) -> usize {
        self.acts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acts.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Arc<Act>> {
        self.acts.iter().find(|act| act.id == id)
    }

    pub fn find_by_artist(&self, artist: &str) -> Option<&Arc<Act>> {
        self.acts.iter().find(|act| act.artist == artist)
    }

    pub fn ids(&self) -> HashSet<&str> {
        self.acts.iter().map(|act| act.id.as_str()).collect()
    }

    /// Union of all reviewer identities, in first-seen order.
    pub fn reviewers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut reviewers = Vec::new();
        for rating in self.acts.iter().flat_map(|act| act.ratings.iter()) {
            if seen.insert(rating.name.as_str()) {
                reviewers.push(rating.name.clone());
            }
        }
        reviewers
    }

    /// True if both snapshots share the same storage.
    pub fn same_as(&self, other: &LineupSnapshot) -> bool {
        Arc::ptr_eq(&self.acts, &other.acts)
    }
}

impl PartialEq for LineupSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other) || self.acts == other.acts
    }
}

/// What the synchronizer publishes to its readers.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub snapshot: LineupSnapshot,
    /// True until the subscription delivered its first snapshot, or until
    /// loading failed. A loading snapshot is not authoritative.
    pub loading: bool,
    /// Number of subscription deliveries applied so far.
    pub deliveries: u64,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            snapshot: LineupSnapshot::default(),
            loading: true,
            deliveries: 0,
        }
    }
}
