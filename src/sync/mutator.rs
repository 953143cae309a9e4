//! Remote rating writes.
//!
//! A write locates the authoritative record, replaces the one rating entry of
//! the reviewer inside the record's `ratings` array and writes the whole array
//! back with a single field-level patch. Other top-level fields of the record
//! and unknown keys inside rating entries are left as stored.
//!
//! Writes to the same record go through a per-record queue and run one at a
//! time in the order they were queued, so each one reads the `ratings` array
//! the previous one wrote.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::document_store::{Document, DocumentId, DocumentRef, DocumentStore, Fields, StoreError};
use crate::lineup::RatingPatch;

const RATINGS_FIELD: &str = "ratings";
const ARTIST_FIELD: &str = "artist";

/// How a write locates its record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    /// Look the record up by its artist name.
    DisplayName(String),
    /// Address the record by its store id.
    Id(DocumentId),
}

impl std::fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationTarget::DisplayName(name) => write!(f, "'{}'", name),
            MutationTarget::Id(id) => write!(f, "#{}", id),
        }
    }
}

/// Result of a remote write. None of these is an error for the caller: the
/// local state keeps its optimistic value in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// No record matched the target.
    ActNotFound,
    /// The record has no rating entry for the reviewer.
    ReviewerNotFound,
    /// The store reported an error, which was logged.
    Failed(String),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}

/// A write waiting in a record queue.
struct WriteJob {
    reviewer: String,
    patch: RatingPatch,
    response: oneshot::Sender<MutationOutcome>,
}

type RecordQueues = HashMap<MutationTarget, mpsc::UnboundedSender<WriteJob>>;

/// Clones share their record queues.
#[derive(Clone)]
pub struct RecordMutator {
    store: Arc<dyn DocumentStore>,
    collection: String,
    queues: Arc<Mutex<RecordQueues>>,
}

impl RecordMutator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Writes one rating field of one record and waits for the outcome.
    pub async fn set_field(
        &self,
        target: &MutationTarget,
        reviewer: &str,
        patch: &RatingPatch,
    ) -> MutationOutcome {
        self.enqueue(target.clone(), reviewer, patch.clone())
            .await
            .unwrap_or_else(|_| MutationOutcome::Failed("Write queue stopped".to_string()))
    }

    /// Queues a write behind the earlier writes to the same record and
    /// returns a receiver for its outcome. Store errors are logged and
    /// reported as [`MutationOutcome::Failed`].
    ///
    /// Must be called within a Tokio runtime.
    pub fn enqueue(
        &self,
        target: MutationTarget,
        reviewer: &str,
        patch: RatingPatch,
    ) -> oneshot::Receiver<MutationOutcome> {
        let (response, outcome) = oneshot::channel();
        let job = WriteJob {
            reviewer: reviewer.to_string(),
            patch,
            response,
        };

        let mut queues = self.queues.lock().unwrap();
        let job = match queues.get(&target) {
            Some(queue) => match queue.send(job) {
                Ok(()) => return outcome,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (queue, jobs) = mpsc::unbounded_channel();
        let _ = queue.send(job);
        queues.insert(target.clone(), queue);
        tokio::spawn(self.clone().drain_queue(target, jobs));
        outcome
    }

    /// Number of records with writes queued or running.
    pub fn busy_records(&self) -> usize {
        self.queues.lock().unwrap().len()
    }

    /// Runs the queued writes of one record, then retires the queue once it
    /// is empty.
    async fn drain_queue(
        self,
        target: MutationTarget,
        mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    ) {
        loop {
            let job = match jobs.try_recv() {
                Ok(job) => job,
                Err(_) => {
                    let mut queues = self.queues.lock().unwrap();
                    match jobs.try_recv() {
                        Ok(job) => job,
                        Err(_) => {
                            queues.remove(&target);
                            return;
                        }
                    }
                }
            };
            let outcome = self.write(&target, &job.reviewer, &job.patch).await;
            let _ = job.response.send(outcome);
        }
    }

    async fn write(
        &self,
        target: &MutationTarget,
        reviewer: &str,
        patch: &RatingPatch,
    ) -> MutationOutcome {
        match self.try_set_field(target, reviewer, patch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Failed to write {} of '{}' on {}: {}",
                    patch.field().key(),
                    reviewer,
                    target,
                    e
                );
                MutationOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_set_field(
        &self,
        target: &MutationTarget,
        reviewer: &str,
        patch: &RatingPatch,
    ) -> Result<MutationOutcome, StoreError> {
        let Some(record) = self.locate(target).await? else {
            info!("No act matches {}, dropping the write", target);
            return Ok(MutationOutcome::ActNotFound);
        };

        let mut ratings = match record.fields.get(RATINGS_FIELD) {
            Some(Value::Array(ratings)) => ratings.clone(),
            _ => Vec::new(),
        };
        let Some(entry) = ratings
            .iter_mut()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some(reviewer))
            .and_then(Value::as_object_mut)
        else {
            info!("Act {} has no rating by '{}', dropping the write", target, reviewer);
            return Ok(MutationOutcome::ReviewerNotFound);
        };
        entry.insert(patch.field().key().to_string(), patch.json_value());

        let mut fields = Fields::new();
        fields.insert(RATINGS_FIELD.to_string(), Value::Array(ratings));
        self.store
            .patch_fields(&record.reference(&self.collection), fields)
            .await?;

        debug!(
            "Wrote {} of '{}' on {}",
            patch.field().key(),
            reviewer,
            target
        );
        Ok(MutationOutcome::Applied)
    }

    async fn locate(&self, target: &MutationTarget) -> Result<Option<Document>, StoreError> {
        match target {
            MutationTarget::Id(id) => {
                self.store
                    .get(&DocumentRef::new(self.collection.as_str(), id.as_str()))
                    .await
            }
            MutationTarget::DisplayName(name) => {
                let mut matches = self
                    .store
                    .find_by_field(&self.collection, ARTIST_FIELD, &Value::from(name.as_str()))
                    .await?;
                if matches.len() > 1 {
                    warn!(
                        "{} acts are named '{}', writing to the first one",
                        matches.len(),
                        name
                    );
                }
                Ok(if matches.is_empty() {
                    None
                } else {
                    Some(matches.swap_remove(0))
                })
            }
        }
    }
}
