//! End-to-end tests for debounced note edits

mod common;

use common::{TestLineup, ALICE, BOB, EXAMPLE_BAND, OTHER_ACT};
use lineup_sync::sync::SessionConfig;
use serde_json::json;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(750);

fn config() -> SessionConfig {
    SessionConfig {
        note_debounce: DEBOUNCE,
        ..SessionConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_rapid_note_edits_collapse_into_one_write() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session_with(config()).await;
    let id = lineup.id_of(EXAMPLE_BAND).await;

    for text in ["g", "gr", "gre", "grea", "great"] {
        session.edit_note(&id, ALICE, text).unwrap();
        // Every keystroke shows up locally right away.
        let local = session.snapshot();
        assert_eq!(local.find(&id).unwrap().rating(ALICE).unwrap().notes, text);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(lineup.store.patch_count(), 0);
    assert_eq!(session.pending_notes(), 1);

    session.flush_notes().await;

    assert_eq!(lineup.store.patch_count(), 1);
    assert_eq!(lineup.stored(EXAMPLE_BAND, ALICE, "notes").await, json!("great"));
}

#[tokio::test(start_paused = true)]
async fn test_notes_of_different_acts_are_written_separately() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session_with(config()).await;
    let example = lineup.id_of(EXAMPLE_BAND).await;
    let other = lineup.id_of(OTHER_ACT).await;

    session.edit_note(&example, ALICE, "first").unwrap();
    session.edit_note(&other, ALICE, "second").unwrap();
    session.edit_note(&other, BOB, "third").unwrap();
    assert_eq!(session.pending_notes(), 3);

    session.flush_notes().await;

    assert_eq!(lineup.store.patch_count(), 3);
    assert_eq!(lineup.stored(EXAMPLE_BAND, ALICE, "notes").await, json!("first"));
    assert_eq!(lineup.stored(OTHER_ACT, ALICE, "notes").await, json!("second"));
    assert_eq!(lineup.stored(OTHER_ACT, BOB, "notes").await, json!("third"));
}

#[tokio::test(start_paused = true)]
async fn test_quiet_period_restarts_on_each_edit() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session_with(config()).await;
    let id = lineup.id_of(EXAMPLE_BAND).await;

    session.edit_note(&id, ALICE, "a").unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    session.edit_note(&id, ALICE, "ab").unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    // 1400ms after the first edit, but only 700ms after the last one.
    assert_eq!(lineup.store.patch_count(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio::task::yield_now().await;
    session.flush_notes().await;
    assert_eq!(lineup.store.patch_count(), 1);
    assert_eq!(lineup.stored(EXAMPLE_BAND, ALICE, "notes").await, json!("ab"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_armed_note_timers() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session_with(config()).await;
    let id = lineup.id_of(EXAMPLE_BAND).await;

    session.edit_note(&id, ALICE, "never sent").unwrap();
    session.shutdown().await;
    assert_eq!(session.pending_notes(), 0);

    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(lineup.store.patch_count(), 0);
    assert_eq!(lineup.stored(EXAMPLE_BAND, ALICE, "notes").await, json!(""));
}

#[tokio::test(start_paused = true)]
async fn test_dispatched_note_write_survives_shutdown() {
    let lineup = TestLineup::seed().await;
    let session = lineup.open_session_with(config()).await;
    let id = lineup.id_of(EXAMPLE_BAND).await;

    lineup.store.close_gate();
    session.edit_note(&id, BOB, "dispatched").unwrap();
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
    tokio::task::yield_now().await;
    // The timer fired and the write is waiting on the store.
    assert_eq!(lineup.store.patch_count(), 1);

    session.shutdown().await;
    lineup.store.open_gate();
    session.flush_notes().await;

    assert_eq!(lineup.stored(EXAMPLE_BAND, BOB, "notes").await, json!("dispatched"));
}
