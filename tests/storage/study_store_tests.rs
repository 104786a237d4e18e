//! StudyStore interface tests.
//!
//! These tests verify the contract of the StudyStore trait.
//! Each storage implementation should run these tests.

use uuid::Uuid;

use study_coordinator::model::{Round, Stage, Study};
use study_coordinator::storage::{StorageError, StudyStore, WriteSet};

/// A study for a fresh, unique group.
pub fn make_study(prefix: &str) -> Study {
    Study::new(format!("{prefix}-{}", Uuid::new_v4()), "manager")
}

/// Insert a study and open a first round for it, returning both as stored.
async fn seed_round<S: StudyStore>(store: &S, prefix: &str) -> (Study, Round) {
    let study = make_study(prefix);
    store.insert_study(&study).await.expect("insert should succeed");
    let mut study = store
        .find_study(&study.group_id)
        .await
        .expect("find should succeed")
        .expect("study should exist");

    let round = Round::new(study.id.clone(), 1, "Pattern matching");
    study.set_ongoing_round_id(round.id.clone());
    study.set_stage(Stage::RegistrationOpen);
    store
        .commit(WriteSet {
            study: Some(study.clone()),
            round: Some(round.clone()),
        })
        .await
        .expect("commit should succeed");

    let study = store.find_study(&study.group_id).await.unwrap().unwrap();
    let round = store.find_round(&round.id).await.unwrap().unwrap();
    (study, round)
}

// =============================================================================
// StudyStore::insert_study tests
// =============================================================================

pub async fn test_insert_and_find<S: StudyStore>(store: &S) {
    let study = make_study("test_insert");
    store.insert_study(&study).await.expect("insert should succeed");

    let found = store
        .find_study(&study.group_id)
        .await
        .expect("find should succeed")
        .expect("study should exist");
    assert_eq!(found.id, study.id);
    assert_eq!(found.manager_id, "manager");
    assert_eq!(found.version, 1, "insert should store version 1");
}

pub async fn test_insert_duplicate_group<S: StudyStore>(store: &S) {
    let study = make_study("test_duplicate");
    store.insert_study(&study).await.expect("insert should succeed");

    let again = Study::new(study.group_id.clone(), "someone-else");
    let err = store.insert_study(&again).await.unwrap_err();
    assert!(
        matches!(err, StorageError::StudyExists(ref group) if *group == study.group_id),
        "unexpected error: {err:?}"
    );
}

pub async fn test_find_missing<S: StudyStore>(store: &S) {
    assert!(store.find_study("test_missing").await.unwrap().is_none());
    assert!(store.find_round("no-such-round").await.unwrap().is_none());
}

// =============================================================================
// StudyStore::commit tests
// =============================================================================

pub async fn test_commit_inserts_round<S: StudyStore>(store: &S) {
    let (study, round) = seed_round(store, "test_commit_round").await;

    assert_eq!(study.version, 2);
    assert_eq!(study.current_stage, Stage::RegistrationOpen);
    assert_eq!(study.ongoing_round_id, round.id);
    assert_eq!(round.version, 1);
    assert_eq!(round.title, "Pattern matching");
}

pub async fn test_commit_updates_round<S: StudyStore>(store: &S) {
    let (_, mut round) = seed_round(store, "test_update_round").await;

    round
        .member_entry("alice")
        .unwrap()
        .register("Alice", "Closures")
        .unwrap();
    store
        .commit(WriteSet {
            study: None,
            round: Some(round.clone()),
        })
        .await
        .expect("commit should succeed");

    let stored = store.find_round(&round.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert!(stored.members["alice"].registered);
}

pub async fn test_commit_stale_study_conflicts<S: StudyStore>(store: &S) {
    let (study, _) = seed_round(store, "test_stale").await;

    let mut first = study.clone();
    first.set_report_url("https://example.com/a");
    store
        .commit(WriteSet {
            study: Some(first),
            round: None,
        })
        .await
        .expect("first writer should win");

    let mut second = study;
    second.set_report_url("https://example.com/b");
    let err = store
        .commit(WriteSet {
            study: Some(second.clone()),
            round: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err:?}");

    let stored = store.find_study(&second.group_id).await.unwrap().unwrap();
    assert_eq!(stored.report_url.as_deref(), Some("https://example.com/a"));
}

pub async fn test_commit_is_all_or_nothing<S: StudyStore>(store: &S) {
    let (study, round) = seed_round(store, "test_atomic").await;

    // Move the round on so the next commit carries a stale round version.
    let mut bumped = round.clone();
    bumped.set_content_url("https://example.com/notes").unwrap();
    store
        .commit(WriteSet {
            study: None,
            round: Some(bumped),
        })
        .await
        .unwrap();

    let mut study_update = study.clone();
    study_update.set_notice_channel_id("announcements");
    let mut stale_round = round;
    stale_round.title = "Rewritten".into();
    let err = store
        .commit(WriteSet {
            study: Some(study_update),
            round: Some(stale_round.clone()),
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err:?}");

    let stored_study = store.find_study(&study.group_id).await.unwrap().unwrap();
    assert_eq!(stored_study.version, study.version);
    assert!(stored_study.notice_channel_id.is_empty());
    let stored_round = store.find_round(&stale_round.id).await.unwrap().unwrap();
    assert_eq!(stored_round.title, "Pattern matching");
}

pub async fn test_commit_new_round_twice_conflicts<S: StudyStore>(store: &S) {
    let (_, round) = seed_round(store, "test_reinsert").await;

    let mut fresh = round.clone();
    fresh.version = 0;
    let err = store
        .commit(WriteSet {
            study: None,
            round: Some(fresh),
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err:?}");
}

/// Run every StudyStore contract test against `$store`.
#[macro_export]
macro_rules! run_study_store_tests {
    ($store:expr) => {
        storage::study_store_tests::test_insert_and_find($store).await;
        storage::study_store_tests::test_insert_duplicate_group($store).await;
        storage::study_store_tests::test_find_missing($store).await;
        storage::study_store_tests::test_commit_inserts_round($store).await;
        storage::study_store_tests::test_commit_updates_round($store).await;
        storage::study_store_tests::test_commit_stale_study_conflicts($store).await;
        storage::study_store_tests::test_commit_is_all_or_nothing($store).await;
        storage::study_store_tests::test_commit_new_round_twice_conflicts($store).await;
    };
}
