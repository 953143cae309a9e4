//! Pending-write tracking for stores without local-echo guarantees.
//!
//! Every optimistic edit registers the patched `(act, reviewer, field)` here
//! before its remote write is issued. Incoming snapshots are overlaid with the
//! pending values, so a snapshot that predates the write cannot revert the
//! local edit. An entry is released once a snapshot carries the written value,
//! when the write fails, or when its act disappears from the collection.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use super::optimistic::apply_rating_patch;
use super::snapshot::LineupSnapshot;
use crate::document_store::DocumentId;
use crate::lineup::{RatingField, RatingPatch};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub act_id: DocumentId,
    pub reviewer: String,
    pub field: RatingField,
}

impl PendingKey {
    pub fn new(act_id: &str, reviewer: &str, field: RatingField) -> Self {
        Self {
            act_id: act_id.to_string(),
            reviewer: reviewer.to_string(),
            field,
        }
    }
}

/// Identifies one registration, so a stale failure cannot release a newer
/// edit to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTicket(u64);

struct PendingEntry {
    patch: RatingPatch,
    ticket: WriteTicket,
}

#[derive(Default)]
struct PendingInner {
    next_ticket: u64,
    entries: HashMap<PendingKey, PendingEntry>,
}

#[derive(Default)]
pub struct PendingWrites {
    inner: Mutex<PendingInner>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `patch` as pending, replacing any older edit to the same key.
    pub fn register(&self, act_id: &str, reviewer: &str, patch: &RatingPatch) -> WriteTicket {
        let mut inner = self.inner.lock().unwrap();
        let ticket = WriteTicket(inner.next_ticket);
        inner.next_ticket += 1;
        inner.entries.insert(
            PendingKey::new(act_id, reviewer, patch.field()),
            PendingEntry {
                patch: patch.clone(),
                ticket,
            },
        );
        ticket
    }

    /// Releases the entry if it still belongs to `ticket`. Called when the
    /// remote write failed: the next snapshot then shows the remote value.
    pub fn release(&self, key: &PendingKey, ticket: WriteTicket) {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.ticket == ticket)
        {
            inner.entries.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlays the pending values on an incoming snapshot, releasing the
    /// entries the snapshot already confirms.
    pub fn overlay(&self, incoming: LineupSnapshot) -> LineupSnapshot {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.is_empty() {
            return incoming;
        }

        let mut confirmed = Vec::new();
        let mut result = incoming;
        for (key, entry) in inner.entries.iter() {
            let remote = result
                .find(&key.act_id)
                .and_then(|act| act.rating(&key.reviewer).cloned());
            match remote {
                None => confirmed.push(key.clone()),
                Some(rating) if rating.already_has(&entry.patch) => confirmed.push(key.clone()),
                Some(_) => {
                    result = apply_rating_patch(&result, &key.act_id, &key.reviewer, &entry.patch);
                }
            }
        }

        for key in confirmed {
            debug!(
                "Pending {} write on {} by '{}' settled",
                key.field.key(),
                key.act_id,
                key.reviewer
            );
            inner.entries.remove(&key);
        }
        result
    }
}
