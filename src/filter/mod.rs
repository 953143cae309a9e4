//! Filter pipeline over a lineup snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::lineup::{Act, Day};
use crate::sync::LineupSnapshot;

/// The three user-controlled filter inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineupFilter {
    /// Case-insensitive substring of the artist name. Empty matches all.
    pub search: String,
    /// An act matches if it carries any of these genres.
    pub genres: BTreeSet<String>,
    pub days: BTreeSet<Day>,
}

impl LineupFilter {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_days(mut self, days: impl IntoIterator<Item = Day>) -> Self {
        self.days = days.into_iter().collect();
        self
    }
}

/// Sorted, de-duplicated union of all genre tags.
pub fn genre_options(acts: &[Arc<Act>]) -> Vec<String> {
    acts.iter()
        .flat_map(|act| act.genre.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Returns the acts that satisfy every predicate of `filter`, in their
/// original order.
///
/// The genre predicate is inactive when no genre or every known genre is
/// selected; the day predicate when no day or all festival days are.
pub fn filter_acts(acts: &[Arc<Act>], filter: &LineupFilter) -> Vec<Arc<Act>> {
    let search = filter.search.to_lowercase();
    let genre_active = !filter.genres.is_empty() && {
        let options = genre_options(acts);
        !options.iter().all(|genre| filter.genres.contains(genre))
    };
    let day_active = !filter.days.is_empty()
        && !Day::FESTIVAL_DAYS
            .iter()
            .all(|day| filter.days.contains(day));

    acts.iter()
        .filter(|act| search.is_empty() || act.artist.to_lowercase().contains(&search))
        .filter(|act| !genre_active || act.genre.iter().any(|g| filter.genres.contains(g)))
        .filter(|act| !day_active || filter.days.contains(&act.day))
        .cloned()
        .collect()
}

/// Memoized filter output.
///
/// Recomputes only when the snapshot (compared by identity) or the filter
/// changed since the previous call.
#[derive(Default)]
pub struct FilteredView {
    cached: Option<CachedView>,
    recomputations: u64,
}

struct CachedView {
    snapshot: LineupSnapshot,
    filter: LineupFilter,
    acts: Arc<Vec<Arc<Act>>>,
}

impl FilteredView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, snapshot: &LineupSnapshot, filter: &LineupFilter) -> Arc<Vec<Arc<Act>>> {
        if let Some(cached) = &self.cached {
            if cached.snapshot.same_as(snapshot) && &cached.filter == filter {
                return cached.acts.clone();
            }
        }

        let acts = Arc::new(filter_acts(snapshot.acts(), filter));
        self.recomputations += 1;
        self.cached = Some(CachedView {
            snapshot: snapshot.clone(),
            filter: filter.clone(),
            acts: acts.clone(),
        });
        acts
    }

    /// How many times the output was computed.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}
