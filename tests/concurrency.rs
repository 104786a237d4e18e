//! Concurrent commands against the façade.
//!
//! Run with: cargo test --test concurrency
//!
//! Commands for one study must serialize; unrelated studies proceed in
//! parallel.

mod common;

use common::{manager, member, TestApp};
use study_coordinator::services::ServiceOptions;
use study_coordinator::{ErrorKind, Stage, StudyError};

async fn to_submission_open(app: &TestApp, group_id: &str) {
    let mgr = manager(group_id);
    app.service.create_study(&mgr).await.unwrap();
    app.service.open_registration(&mgr, "Concurrency").await.unwrap();
    app.service.close_registration(&mgr).await.unwrap();
    app.service.open_submission(&mgr).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_close_submission_advances_once() {
    let app = TestApp::new();
    to_submission_open(&app, "race").await;

    let first = {
        let service = app.service.clone();
        tokio::spawn(async move { service.close_submission(&manager("race")).await })
    };
    let second = {
        let service = app.service.clone();
        tokio::spawn(async move { service.close_submission(&manager("race")).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1, "exactly one close should win: {results:?}");

    let failure = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one close should fail");
    match failure {
        StudyError::InvalidStage { current, .. } => assert_eq!(*current, Stage::SubmissionClosed),
        other => panic!("unexpected error: {other:?}"),
    }

    let study = app.service.get_study("race").await.unwrap();
    assert_eq!(study.current_stage, Stage::SubmissionClosed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_all_land() {
    let app = TestApp::new();
    let mgr = manager("crowd");
    app.service.create_study(&mgr).await.unwrap();
    app.service.open_registration(&mgr, "Channels").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = app.service.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("member-{i}");
            service
                .register_member(&member("crowd", &id), &id, "Select loops")
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let round = app.service.get_current_round(&mgr).await.unwrap();
    assert_eq!(round.speakers().count(), 16);
    // No write ever lost a race.
    assert_eq!(round.version, 17);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_studies_complete_independently() {
    let app = TestApp::new();

    let mut handles = Vec::new();
    for g in 0..8 {
        let service = app.service.clone();
        handles.push(tokio::spawn(async move {
            let mgr = manager(&format!("group-{g}"));
            service.create_study(&mgr).await?;
            service.open_registration(&mgr, "Parallel").await?;
            service.close_registration(&mgr).await?;
            service.open_submission(&mgr).await?;
            service.close_submission(&mgr).await?;
            service.start_presentation(&mgr).await?;
            service.finish_presentation(&mgr).await?;
            service.open_review(&mgr).await?;
            service.close_review(&mgr).await?;
            service.finalize_cycle(&mgr).await
        }));
    }

    for handle in handles {
        let update = handle.await.unwrap().unwrap();
        assert_eq!(update.study.current_stage, Stage::Wait);
        assert_eq!(update.round.unwrap().stage, Stage::Finished);
    }
    assert_eq!(app.cache.len(), 0);
}

#[tokio::test]
async fn test_exhausted_conflicts_surface_as_transient() {
    let app = TestApp::with_options(ServiceOptions {
        store_retries: 2,
        ..ServiceOptions::default()
    });
    app.service.create_study(&manager("flaky")).await.unwrap();
    app.store.inject_conflicts(usize::MAX);

    let err = app
        .service
        .open_registration(&manager("flaky"), "Doomed")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientStoreConflict);
    assert!(matches!(err, StudyError::ConflictRetriesExhausted { attempts: 3 }));

    let study = app.service.get_study("flaky").await.unwrap();
    assert_eq!(study.current_stage, Stage::Wait);
}
