use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::{ErrorKind, StudyError};
use crate::machine::{self, StageCommand};
use crate::model::Stage;

const DEADLINE: Duration = Duration::from_secs(5);

async fn seeded() -> (Arc<InMemoryStudyStore>, TransactionExecutor) {
    let store = Arc::new(InMemoryStudyStore::new());
    let executor = TransactionExecutor::new(store.clone(), 3);
    executor
        .create(DEADLINE, Study::new("guild", "manager"))
        .await
        .unwrap();
    (store, executor)
}

#[tokio::test]
async fn test_insert_study_rejects_duplicate_group() {
    let store = InMemoryStudyStore::new();
    store.insert_study(&Study::new("guild", "a")).await.unwrap();
    let err = store
        .insert_study(&Study::new("guild", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StudyExists(ref g) if g == "guild"));

    let stored = store.find_study("guild").await.unwrap().unwrap();
    assert_eq!(stored.manager_id, "a");
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_executor_create_maps_duplicate() {
    let (_, executor) = seeded().await;
    let err = executor
        .create(DEADLINE, Study::new("guild", "other"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInState);
}

#[tokio::test]
async fn test_commit_rejects_stale_version() {
    let store = InMemoryStudyStore::new();
    store.insert_study(&Study::new("guild", "m")).await.unwrap();

    let loaded = store.find_study("guild").await.unwrap().unwrap();
    let mut first = loaded.clone();
    first.set_notice_channel_id("one");
    store
        .commit(WriteSet {
            study: Some(first),
            round: None,
        })
        .await
        .unwrap();

    let mut second = loaded;
    second.set_notice_channel_id("two");
    let err = store
        .commit(WriteSet {
            study: Some(second),
            round: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let stored = store.find_study("guild").await.unwrap().unwrap();
    assert_eq!(stored.notice_channel_id, "one");
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_commit_is_all_or_nothing() {
    let store = InMemoryStudyStore::new();
    store.insert_study(&Study::new("guild", "m")).await.unwrap();

    let mut study = store.find_study("guild").await.unwrap().unwrap();
    let mut round = Round::new(study.id.clone(), 1, "r");
    // Claims to be an update of a round that was never stored.
    round.version = 4;
    study.set_ongoing_round_id(round.id.clone());

    let err = store
        .commit(WriteSet {
            study: Some(study),
            round: Some(round),
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let stored = store.find_study("guild").await.unwrap().unwrap();
    assert!(stored.ongoing_round_id.is_empty());
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_write_set_diff_only_changed() {
    let study = Study::new("guild", "m");
    let round = Round::new(study.id.clone(), 1, "r");
    let loaded = Aggregate::new(study, Some(round));

    assert!(WriteSet::diff(&loaded, &loaded.clone()).is_empty());

    let mut updated = loaded.clone();
    updated.study.set_manager_id("other");
    let writes = WriteSet::diff(&loaded, &updated);
    assert!(writes.study.is_some());
    assert!(writes.round.is_none());
}

#[tokio::test]
async fn test_execute_commits_and_bumps_versions() {
    let (store, executor) = seeded().await;

    let committed = executor
        .execute(DEADLINE, "guild", |mut agg| {
            let transition = machine::open_registration(&mut agg, "First")?;
            Ok((agg, transition))
        })
        .await
        .unwrap();

    assert_eq!(committed.value.to, Stage::RegistrationOpen);
    let round = committed.aggregate.round.as_ref().unwrap();
    assert_eq!(round.version, 1);
    assert_eq!(committed.aggregate.study.version, 2);

    let stored = store.find_study("guild").await.unwrap().unwrap();
    assert_eq!(stored, committed.aggregate.study);
    let stored_round = store.find_round(&round.id).await.unwrap().unwrap();
    assert_eq!(&stored_round, round);
}

#[tokio::test]
async fn test_execute_missing_study() {
    let store = Arc::new(InMemoryStudyStore::new());
    let executor = TransactionExecutor::new(store, 3);
    let err = executor
        .execute(DEADLINE, "nobody", |agg| Ok((agg, ())))
        .await
        .unwrap_err();
    assert!(matches!(err, StudyError::StudyNotFound(_)));
}

#[tokio::test]
async fn test_execute_domain_error_is_not_retried() {
    let (store, executor) = seeded().await;
    let calls = AtomicUsize::new(0);

    let err = executor
        .execute(DEADLINE, "guild", |mut agg| {
            calls.fetch_add(1, Ordering::SeqCst);
            machine::apply(&mut agg, StageCommand::CloseSubmission)?;
            Ok((agg, ()))
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidStage);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_execute_retries_injected_conflicts() {
    let (store, executor) = seeded().await;
    store.inject_conflicts(2);
    let calls = AtomicUsize::new(0);

    let committed = executor
        .execute(DEADLINE, "guild", |mut agg| {
            calls.fetch_add(1, Ordering::SeqCst);
            agg.study.set_notice_channel_id("notices");
            Ok((agg, ()))
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(committed.aggregate.study.notice_channel_id, "notices");
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_execute_reports_exhausted_retries() {
    let (store, executor) = seeded().await;
    store.inject_conflicts(100);

    let err = executor
        .execute(DEADLINE, "guild", |mut agg| {
            agg.study.set_notice_channel_id("notices");
            Ok((agg, ()))
        })
        .await
        .unwrap_err();

    match err {
        StudyError::ConflictRetriesExhausted { attempts } => assert_eq!(attempts, 4),
        other => panic!("unexpected error: {other:?}"),
    }
    let stored = store.find_study("guild").await.unwrap().unwrap();
    assert!(stored.notice_channel_id.is_empty());
}

#[tokio::test]
async fn test_execute_without_changes_skips_commit() {
    let (store, executor) = seeded().await;
    let committed = executor
        .execute(DEADLINE, "guild", |agg| {
            let stage = agg.study.current_stage;
            Ok((agg, stage))
        })
        .await
        .unwrap();
    assert_eq!(committed.value, Stage::Wait);
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn test_init_storage_memory_and_unknown() {
    let config = StorageConfig {
        storage_type: "memory".to_string(),
        path: String::new(),
    };
    let store = init_storage(&config).await.unwrap();
    assert!(store.find_study("guild").await.unwrap().is_none());

    let config = StorageConfig {
        storage_type: "cassandra".to_string(),
        path: String::new(),
    };
    assert!(matches!(
        init_storage(&config).await,
        Err(StorageError::UnknownBackend(_))
    ));
}
