//! Full study cycle through the service façade.
//!
//! Run with: cargo test --test lifecycle
//!
//! In-memory store, cache and mock bus; no external services required.

mod common;

use std::time::Duration;

use common::{manager, member, TestApp};
use study_coordinator::bus::Topic;
use study_coordinator::cache::{PopulateOutcome, RoundCache};
use study_coordinator::services::{ReadSource, ServiceOptions};
use study_coordinator::{ErrorKind, Stage};

const GROUP: &str = "S1";

#[tokio::test]
async fn test_end_to_end_cycle() {
    let app = TestApp::new();
    let svc = &app.service;
    let mgr = manager(GROUP);
    let m1 = member(GROUP, "M1");
    let m2 = member(GROUP, "M2");

    let created = svc.create_study(&mgr).await.unwrap();
    assert_eq!(created.study.current_stage, Stage::Wait);
    assert!(created.study.ongoing_round_id.is_empty());

    let opened = svc.open_registration(&mgr, "Error handling").await.unwrap();
    assert_eq!(opened.study.current_stage, Stage::RegistrationOpen);
    let round_id = opened.round.expect("round should be opened").id;
    assert_eq!(opened.study.ongoing_round_id, round_id);

    svc.register_member(&m1, "Alice", "X").await.unwrap();
    let err = svc.register_member(&m1, "Alice", "X").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInState);
    svc.register_member(&m2, "Bob", "Y").await.unwrap();

    let closed = svc.close_registration(&mgr).await.unwrap();
    assert_eq!(closed.study.current_stage, Stage::RegistrationClosed);

    svc.open_submission(&mgr).await.unwrap();
    let submitted = svc.submit_content(&m1, "http://x").await.unwrap();
    assert_eq!(
        submitted.round.unwrap().members["M1"].content_url,
        "http://x"
    );
    svc.close_submission(&mgr).await.unwrap();

    svc.start_presentation(&mgr).await.unwrap();
    svc.mark_attendance(&mgr, "M1", true).await.unwrap();
    svc.finish_presentation(&mgr).await.unwrap();

    svc.open_review(&mgr).await.unwrap();
    let reviewed = svc.assign_reviewer(&m2, "M2", "M1").await.unwrap();
    assert!(reviewed.round.unwrap().members["M1"].is_reviewer("M2"));
    let err = svc.assign_reviewer(&m1, "M1", "M1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SelfReferenceRejected);

    svc.close_review(&mgr).await.unwrap();
    let finished = svc.finalize_cycle(&mgr).await.unwrap();
    assert_eq!(finished.study.current_stage, Stage::Wait);
    assert!(finished.study.ongoing_round_id.is_empty());

    let round = svc.get_round(&round_id).await.unwrap();
    assert_eq!(round.stage, Stage::Finished);
    assert!(round.members["M1"].attended);

    // The frozen round is never touched again.
    svc.open_registration(&mgr, "Next topic").await.unwrap();
    let again = svc.get_round(&round_id).await.unwrap();
    assert_eq!(again, round);

    // created, ten stage events, two registrations, content, attendance
    // and the review.
    assert!(app.bus.wait_for(16, Duration::from_secs(2)).await);
    let topics = app.bus.topics().await;
    assert_eq!(topics.iter().filter(|t| **t == Topic::RoundFinished).count(), 1);
    assert_eq!(topics.iter().filter(|t| **t == Topic::MemberRegistered).count(), 2);
    assert!(topics.contains(&Topic::ReviewerAssigned));

    app.service.shutdown().await;
}

#[tokio::test]
async fn test_stage_visits_every_stage_in_order() {
    let app = TestApp::new();
    let svc = &app.service;
    let mgr = manager(GROUP);
    svc.create_study(&mgr).await.unwrap();

    let mut visited = vec![svc.get_study(GROUP).await.unwrap().current_stage];
    visited.push(svc.open_registration(&mgr, "Macros").await.unwrap().study.current_stage);
    visited.push(svc.close_registration(&mgr).await.unwrap().study.current_stage);
    visited.push(svc.open_submission(&mgr).await.unwrap().study.current_stage);
    visited.push(svc.close_submission(&mgr).await.unwrap().study.current_stage);
    visited.push(svc.start_presentation(&mgr).await.unwrap().study.current_stage);
    visited.push(svc.finish_presentation(&mgr).await.unwrap().study.current_stage);
    visited.push(svc.open_review(&mgr).await.unwrap().study.current_stage);
    visited.push(svc.close_review(&mgr).await.unwrap().study.current_stage);
    let finished = svc.finalize_cycle(&mgr).await.unwrap();
    visited.push(finished.round.unwrap().stage);
    visited.push(finished.study.current_stage);

    let mut expected = Stage::ALL.to_vec();
    expected.push(Stage::Wait);
    assert_eq!(visited, expected);
}

#[tokio::test]
async fn test_unregister_never_registered_fails() {
    let app = TestApp::new();
    let mgr = manager(GROUP);
    app.service.create_study(&mgr).await.unwrap();
    app.service.open_registration(&mgr, "Generics").await.unwrap();

    let err = app
        .service
        .unregister_member(&member(GROUP, "M9"), "M9")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInState);
}

#[tokio::test]
async fn test_self_review_rejected_regardless_of_stage() {
    let app = TestApp::new();
    let mgr = manager(GROUP);
    app.service.create_study(&mgr).await.unwrap();
    app.service.open_registration(&mgr, "Unsafe").await.unwrap();

    let err = app
        .service
        .assign_reviewer(&member(GROUP, "M1"), "M1", "M1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SelfReferenceRejected);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_miss_and_ttl() {
    let ttl = Duration::from_secs(60);
    let app = TestApp::with_options(ServiceOptions {
        cache_ttl: ttl,
        populate_delay: Duration::from_millis(10),
        ..ServiceOptions::default()
    });
    let mgr = manager(GROUP);
    app.service.create_study(&mgr).await.unwrap();
    app.service.open_registration(&mgr, "Smart pointers").await.unwrap();
    app.cache.remove(GROUP).await.unwrap();

    let miss = app.service.read_current_round(&mgr).await.unwrap();
    assert_eq!(miss.source, ReadSource::Store);
    let outcome = miss.population.expect("miss should populate").wait().await;
    assert!(matches!(outcome, PopulateOutcome::Stored { .. }));

    tokio::time::advance(ttl / 2).await;
    let hit = app.service.read_current_round(&mgr).await.unwrap();
    assert_eq!(hit.source, ReadSource::Cache);
    assert_eq!(hit.round, miss.round);

    tokio::time::advance(ttl).await;
    let expired = app.service.read_current_round(&mgr).await.unwrap();
    assert_eq!(expired.source, ReadSource::Store);
}
