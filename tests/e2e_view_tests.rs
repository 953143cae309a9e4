//! End-to-end tests for the derived view: filters and reviewer visibility

mod common;

use common::{wait_for_deliveries, TestLineup, ALICE, BOB, EXAMPLE_BAND, LATE_SHOW, OTHER_ACT, WARMUP_SET};
use lineup_sync::filter::{filter_acts, genre_options, FilteredView, LineupFilter};
use lineup_sync::lineup::{Day, ScoreField};
use lineup_sync::preferences::{ReviewerVisibility, SqlitePreferenceStore};
use std::sync::Arc;
use tempfile::TempDir;

fn artists(acts: &[Arc<lineup_sync::Act>]) -> Vec<&str> {
    acts.iter().map(|a| a.artist.as_str()).collect()
}

#[tokio::test]
async fn test_search_exa_matches_example_band_only() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session().await;
    let snapshot = session.snapshot();

    let filtered = filter_acts(snapshot.acts(), &LineupFilter::default().with_search("exa"));
    assert_eq!(artists(&filtered), vec![EXAMPLE_BAND]);
}

#[tokio::test]
async fn test_genre_and_day_filters() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session().await;
    let snapshot = session.snapshot();

    assert_eq!(
        genre_options(snapshot.acts()),
        vec!["electronic", "folk", "indie", "rock"]
    );

    let rock = LineupFilter::default().with_genres(["rock"]);
    assert_eq!(
        artists(&filter_acts(snapshot.acts(), &rock)),
        vec![EXAMPLE_BAND, LATE_SHOW]
    );

    let weekend = LineupFilter::default().with_days([Day::Saturday, Day::Sunday]);
    assert_eq!(
        artists(&filter_acts(snapshot.acts(), &weekend)),
        vec![LATE_SHOW, OTHER_ACT]
    );

    // All three festival days selected keeps Thursday's act too.
    let all_days = LineupFilter::default().with_days(Day::FESTIVAL_DAYS);
    assert!(artists(&filter_acts(snapshot.acts(), &all_days)).contains(&WARMUP_SET));

    let all_genres = LineupFilter::default().with_genres(genre_options(snapshot.acts()));
    assert_eq!(filter_acts(snapshot.acts(), &all_genres).len(), snapshot.len());
}

#[tokio::test]
async fn test_filtered_view_follows_deliveries_and_edits() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session().await;
    let filter = LineupFilter::default().with_genres(["folk"]);
    let mut view = FilteredView::new();
    let mut receiver = session.watch();

    view.get(&session.snapshot(), &filter);
    view.get(&session.snapshot(), &filter);
    assert_eq!(view.recomputations(), 1);

    // An optimistic edit produces a new snapshot.
    let id = lineup.id_of(OTHER_ACT).await;
    let write = session.set_score(&id, BOB, ScoreField::Like, Some(5)).unwrap();
    let folk = view.get(&session.snapshot(), &filter);
    assert_eq!(view.recomputations(), 2);
    assert_eq!(folk[0].rating(BOB).unwrap().like, Some(5));

    write.await.unwrap();
    wait_for_deliveries(&mut receiver, 2).await;
    view.get(&session.snapshot(), &filter);
    assert_eq!(view.recomputations(), 3);
}

#[tokio::test]
async fn test_hidden_reviewer_is_omitted_everywhere() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session().await;
    let temp_dir = TempDir::new().unwrap();
    let preferences_path = temp_dir.path().join("preferences.db");

    {
        let preferences = Arc::new(SqlitePreferenceStore::new(&preferences_path).unwrap());
        let mut visibility =
            ReviewerVisibility::load_or_derive(preferences, &session.snapshot()).unwrap();
        assert_eq!(visibility.visible_count(), 2);
        assert_eq!(visibility.toggle(BOB).unwrap(), Some(false));
    }

    // A later run reads the stored set back.
    let preferences = Arc::new(SqlitePreferenceStore::new(&preferences_path).unwrap());
    let visibility = ReviewerVisibility::load_or_derive(preferences, &session.snapshot()).unwrap();
    assert!(!visibility.is_visible(BOB));
    assert!(visibility.is_visible(ALICE));

    // Bob rated Example Band, and still does not show up.
    let snapshot = session.snapshot();
    for act in snapshot.acts() {
        let shown: Vec<_> = visibility
            .visible_ratings(act)
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(shown, vec![ALICE]);
    }
    assert!(!visibility.use_compact_layout());
}
