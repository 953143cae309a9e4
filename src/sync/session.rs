//! The owning view of a synchronized lineup.
//!
//! A session ties the synchronizer, the record mutator and the note debouncer
//! to one lifetime: shutting it down (or dropping it) releases the
//! subscription and cancels armed note timers. Remote writes that were already
//! issued are left to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::debounce::Debouncer;
use super::mutator::{MutationOutcome, MutationTarget, RecordMutator};
use super::pending::{PendingKey, PendingWrites, WriteTicket};
use super::snapshot::{LineupSnapshot, SyncState};
use super::synchronizer::LineupSynchronizer;
use super::{MutationRouting, ReconcilePolicy};
use crate::document_store::{DocumentId, DocumentStore};
use crate::lineup::{LineupError, RatingPatch, ScoreField};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub collection: String,
    pub note_debounce: Duration,
    pub reconcile_policy: ReconcilePolicy,
    pub mutation_routing: MutationRouting,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            collection: "lineup".to_string(),
            note_debounce: Duration::from_millis(750),
            reconcile_policy: ReconcilePolicy::default(),
            mutation_routing: MutationRouting::default(),
        }
    }
}

/// Debounce key of a note: one per act and reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NoteKey {
    pub act_id: DocumentId,
    pub reviewer: String,
}

pub struct LineupSession {
    synchronizer: LineupSynchronizer,
    mutator: RecordMutator,
    notes: Debouncer<NoteKey>,
    routing: MutationRouting,
    shutdown: CancellationToken,
}

impl LineupSession {
    /// Loads the lineup and starts following it.
    pub async fn open(store: Arc<dyn DocumentStore>, config: SessionConfig) -> Self {
        let shutdown = CancellationToken::new();
        let synchronizer = LineupSynchronizer::new(
            store.clone(),
            config.collection.clone(),
            config.reconcile_policy,
            shutdown.child_token(),
        );
        let session = Self {
            synchronizer,
            mutator: RecordMutator::new(store, config.collection.clone()),
            notes: Debouncer::new(config.note_debounce, shutdown.child_token()),
            routing: config.mutation_routing,
            shutdown,
        };
        session.synchronizer.initialize().await;
        session
    }

    pub fn synchronizer(&self) -> &LineupSynchronizer {
        &self.synchronizer
    }

    pub fn snapshot(&self) -> LineupSnapshot {
        self.synchronizer.snapshot()
    }

    pub fn state(&self) -> Arc<SyncState> {
        self.synchronizer.state()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<SyncState>> {
        self.synchronizer.watch()
    }

    /// Waits for the first delivery, or for loading to fail.
    pub async fn ready(&self) -> Arc<SyncState> {
        self.synchronizer.ready().await
    }

    /// Number of note edits waiting for their quiet period to end.
    pub fn pending_notes(&self) -> usize {
        self.notes.pending_count()
    }

    /// Sets a score of `reviewer` on act `act_id`.
    ///
    /// The local snapshot is updated before this returns; the remote write
    /// runs after the earlier writes to the same act, and its outcome may be
    /// awaited or ignored.
    pub fn set_score(
        &self,
        act_id: &str,
        reviewer: &str,
        field: ScoreField,
        value: Option<u8>,
    ) -> Result<JoinHandle<MutationOutcome>, LineupError> {
        let patch = RatingPatch::score(field, value)?;
        let target = self.prepare(act_id, reviewer)?;
        let ticket = self.register_pending(act_id, reviewer, &patch);
        self.apply_local(act_id, reviewer, &patch);

        // Queued here, so writes to one act are issued in call order.
        let write = self.mutator.enqueue(target, reviewer, patch.clone());
        let pending = self.synchronizer.pending().cloned();
        let reviewer = reviewer.to_string();
        let act_id = act_id.to_string();
        Ok(tokio::spawn(async move {
            let outcome = write
                .await
                .unwrap_or_else(|_| MutationOutcome::Failed("Write queue stopped".to_string()));
            settle(pending.as_deref(), ticket, &act_id, &reviewer, &patch, &outcome);
            outcome
        }))
    }

    /// Edits the note of `reviewer` on act `act_id`.
    ///
    /// The local snapshot is updated immediately; the remote write is issued
    /// once no further edit of the same note arrived for the debounce delay,
    /// and carries the last value.
    pub fn edit_note(&self, act_id: &str, reviewer: &str, notes: &str) -> Result<(), LineupError> {
        let patch = RatingPatch::notes(notes);
        let target = self.prepare(act_id, reviewer)?;
        let ticket = self.register_pending(act_id, reviewer, &patch);
        self.apply_local(act_id, reviewer, &patch);

        let key = NoteKey {
            act_id: act_id.to_string(),
            reviewer: reviewer.to_string(),
        };
        let mutator = self.mutator.clone();
        let pending = self.synchronizer.pending().cloned();
        self.notes.schedule(key.clone(), move || async move {
            let outcome = mutator.set_field(&target, &key.reviewer, &patch).await;
            settle(
                pending.as_deref(),
                ticket,
                &key.act_id,
                &key.reviewer,
                &patch,
                &outcome,
            );
        });
        Ok(())
    }

    /// Waits for armed note timers to fire and their writes to finish.
    pub async fn flush_notes(&self) {
        self.notes.drain().await;
    }

    /// Releases the subscription and cancels armed note timers.
    pub async fn shutdown(&self) {
        info!("Closing lineup session");
        self.notes.cancel_all();
        self.shutdown.cancel();
        self.synchronizer.shutdown().await;
    }

    /// Validates the target against the local snapshot. Returns where the
    /// remote write must go.
    fn prepare(&self, act_id: &str, reviewer: &str) -> Result<MutationTarget, LineupError> {
        let snapshot = self.synchronizer.snapshot();
        let act = snapshot
            .find(act_id)
            .ok_or_else(|| LineupError::UnknownAct(act_id.to_string()))?;
        if act.rating(reviewer).is_none() {
            return Err(LineupError::UnknownReviewer {
                act_id: act_id.to_string(),
                reviewer: reviewer.to_string(),
            });
        }
        let target = match self.routing {
            MutationRouting::DisplayName => MutationTarget::DisplayName(act.artist.clone()),
            MutationRouting::Id => MutationTarget::Id(act.id.clone()),
        };
        Ok(target)
    }

    /// Publishes the optimistic edit. Runs after the pending entry is
    /// registered, so a delivery processed in between keeps the edit.
    fn apply_local(&self, act_id: &str, reviewer: &str, patch: &RatingPatch) {
        if !self.synchronizer.apply_patch(act_id, reviewer, patch) {
            debug!(
                "{} of '{}' on {} already holds the new value",
                patch.field().key(),
                reviewer,
                act_id
            );
        }
    }

    fn register_pending(
        &self,
        act_id: &str,
        reviewer: &str,
        patch: &RatingPatch,
    ) -> Option<WriteTicket> {
        self.synchronizer
            .pending()
            .map(|pending| pending.register(act_id, reviewer, patch))
    }
}

impl Drop for LineupSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Releases a pending edit whose write will never show up in a delivery.
fn settle(
    pending: Option<&PendingWrites>,
    ticket: Option<WriteTicket>,
    act_id: &str,
    reviewer: &str,
    patch: &RatingPatch,
    outcome: &MutationOutcome,
) {
    if outcome.is_applied() {
        return;
    }
    if let (Some(pending), Some(ticket)) = (pending, ticket) {
        pending.release(&PendingKey::new(act_id, reviewer, patch.field()), ticket);
    }
}
