//! Live collection sync and optimistic mutation engine.

mod debounce;
mod mutator;
mod optimistic;
mod pending;
mod session;
mod snapshot;
mod synchronizer;

pub use debounce::Debouncer;
pub use mutator::{MutationOutcome, MutationTarget, RecordMutator};
pub use optimistic::apply_rating_patch;
pub use pending::{PendingKey, PendingWrites, WriteTicket};
pub use session::{LineupSession, NoteKey, SessionConfig};
pub use snapshot::{LineupSnapshot, SyncState};
pub use synchronizer::LineupSynchronizer;

use clap::ValueEnum;

/// How optimistic edits survive snapshot deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReconcilePolicy {
    /// Trust the store to echo its own writes promptly; every delivery
    /// replaces the local state as is.
    #[default]
    LocalEcho,
    /// Keep pending edits on top of deliveries until a delivery confirms them.
    TrackPending,
}

/// How a rating write locates its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MutationRouting {
    /// Look the record up by artist name.
    #[default]
    DisplayName,
    /// Address the record by its store id.
    Id,
}
