//! Optimistic rating updates.
//!
//! Applied to the local snapshot as soon as the user acts, before the remote
//! write is issued.

use std::sync::Arc;

use super::snapshot::LineupSnapshot;
use crate::lineup::{Act, RatingPatch};

/// Returns `snapshot` with `patch` applied to the rating of `reviewer` on act
/// `act_id`.
///
/// Only the targeted act and rating are rebuilt; every other act and rating
/// is shared with the input. If the act or the rating does not exist, or the
/// rating already holds the patched value, the input snapshot itself is
/// returned, so applying the same patch twice is a no-op the second time.
pub fn apply_rating_patch(
    snapshot: &LineupSnapshot,
    act_id: &str,
    reviewer: &str,
    patch: &RatingPatch,
) -> LineupSnapshot {
    let Some(act_index) = snapshot.acts().iter().position(|act| act.id == act_id) else {
        return snapshot.clone();
    };
    let act = &snapshot.acts()[act_index];
    let Some(rating_index) = act.ratings.iter().position(|r| r.name == reviewer) else {
        return snapshot.clone();
    };
    if act.ratings[rating_index].already_has(patch) {
        return snapshot.clone();
    }

    let mut ratings = act.ratings.clone();
    ratings[rating_index] = Arc::new(ratings[rating_index].patched(patch));
    let patched_act = Arc::new(Act {
        ratings,
        ..Act::clone(act)
    });

    let mut acts = snapshot.acts().to_vec();
    acts[act_index] = patched_act;
    LineupSnapshot::from_ordered(acts)
}
