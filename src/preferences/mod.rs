//! Local, per-device preferences.

mod local_store;
mod schema;
mod visibility;

pub use local_store::{InMemoryPreferenceStore, SqlitePreferenceStore};
pub use schema::PREFERENCES_VERSIONED_SCHEMAS;
pub use visibility::{ReviewerFlag, ReviewerVisibility, COMPACT_LAYOUT_THRESHOLD, VISIBILITY_KEY};

use anyhow::Result;

/// String key/value storage on the local device.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Reviewer name as shown to users: first character upper-cased.
pub fn display_label(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
