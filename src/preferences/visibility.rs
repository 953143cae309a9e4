//! Which reviewers' ratings are shown.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::LocalStore;
use crate::lineup::{Act, Rating};
use crate::sync::LineupSnapshot;

/// Key of the persisted set in the local store.
pub const VISIBILITY_KEY: &str = "users";

/// Above this many visible reviewers the ratings use the compact layout.
pub const COMPACT_LAYOUT_THRESHOLD: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerFlag {
    pub name: String,
    pub show: bool,
}

/// Per-reviewer show flags, persisted locally as a whole on every toggle.
pub struct ReviewerVisibility {
    store: Arc<dyn LocalStore>,
    reviewers: Vec<ReviewerFlag>,
}

impl ReviewerVisibility {
    /// Loads the persisted set. If there is none, or it cannot be decoded,
    /// derives one from the reviewers of `snapshot` with everyone visible.
    /// A derived set is persisted on its first toggle.
    pub fn load_or_derive(store: Arc<dyn LocalStore>, snapshot: &LineupSnapshot) -> Result<Self> {
        let stored = store
            .get(VISIBILITY_KEY)
            .context("Failed to read reviewer visibility")?;

        if let Some(raw) = stored {
            match serde_json::from_str::<Vec<ReviewerFlag>>(&raw) {
                Ok(reviewers) => return Ok(Self { store, reviewers }),
                Err(e) => warn!("Discarding unreadable reviewer visibility: {}", e),
            }
        }

        let reviewers: Vec<ReviewerFlag> = snapshot
            .reviewers()
            .into_iter()
            .map(|name| ReviewerFlag { name, show: true })
            .collect();
        info!("Derived visibility for {} reviewers", reviewers.len());
        Ok(Self { store, reviewers })
    }

    pub fn reviewers(&self) -> &[ReviewerFlag] {
        &self.reviewers
    }

    /// Flips the flag of `reviewer` and persists the whole set. Returns the
    /// new flag, or None if the reviewer is not in the set.
    pub fn toggle(&mut self, reviewer: &str) -> Result<Option<bool>> {
        let Some(flag) = self.reviewers.iter_mut().find(|r| r.name == reviewer) else {
            return Ok(None);
        };
        flag.show = !flag.show;
        let show = flag.show;

        let encoded = serde_json::to_string(&self.reviewers)?;
        self.store
            .set(VISIBILITY_KEY, &encoded)
            .context("Failed to persist reviewer visibility")?;
        Ok(Some(show))
    }

    /// Reviewers missing from the set are hidden.
    pub fn is_visible(&self, reviewer: &str) -> bool {
        self.reviewers
            .iter()
            .any(|r| r.name == reviewer && r.show)
    }

    pub fn visible_ratings<'a>(&self, act: &'a Act) -> Vec<&'a Arc<Rating>> {
        act.ratings
            .iter()
            .filter(|rating| self.is_visible(&rating.name))
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.reviewers.iter().filter(|r| r.show).count()
    }

    pub fn use_compact_layout(&self) -> bool {
        self.visible_count() > COMPACT_LAYOUT_THRESHOLD
    }
}
