//! Lineup Sync Library
//!
//! Live synchronization of a festival lineup held in a remote document store,
//! with optimistic rating edits, debounced note writes and a filter pipeline.

pub mod config;
pub mod document_store;
pub mod filter;
pub mod lineup;
pub mod preferences;
pub mod sqlite_persistence;
pub mod sync;

// Re-export commonly used types for convenience
pub use document_store::{DocumentStore, InMemoryDocumentStore, SqliteDocumentStore};
pub use filter::{filter_acts, FilteredView, LineupFilter};
pub use lineup::{Act, Day, Rating, ScoreField};
pub use preferences::{LocalStore, ReviewerVisibility, SqlitePreferenceStore};
pub use sync::{LineupSession, LineupSnapshot, SessionConfig};
