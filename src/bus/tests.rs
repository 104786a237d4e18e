use std::sync::atomic::Ordering;
use std::time::Duration;

use super::*;
use crate::model::Stage;
use crate::test_utils::{make_event, CountingHandler, FailingHandler};

#[test]
fn test_topic_strings_round_trip() {
    for topic in Topic::ALL {
        assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        let json = serde_json::to_string(&topic).unwrap();
        assert_eq!(json, format!("\"{}\"", topic.as_str()));
    }
    assert!("study.unknown".parse::<Topic>().is_err());
}

#[test]
fn test_event_json_wire_form() {
    let event = make_event(Topic::StageChanged).with_stage(Stage::ReviewOpen);
    let value: serde_json::Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();
    assert_eq!(value["topic"], "study.stage.changed");
    assert_eq!(value["stage"], "review_open");
    assert_eq!(StudyEvent::from_json(&event.to_json().unwrap()).unwrap(), event);
}

#[test]
fn test_messaging_config_default() {
    let config = MessagingConfig::default();
    assert_eq!(config.messaging_type, MessagingType::Channel);
    assert_eq!(config.amqp.url, "amqp://localhost:5672");
    assert_eq!(config.amqp.binding, "study.#");

    let publish = PublishConfig::default();
    assert_eq!(publish.retry_interval(), Duration::from_millis(500));
    assert_eq!(publish.deadline(), Duration::from_secs(5));
}

#[test]
fn test_mapper_last_registration_wins() {
    let (first, _rx1) = CountingHandler::new();
    let (second, _rx2) = CountingHandler::new();
    let first: Arc<dyn EventHandler> = Arc::new(first);
    let second: Arc<dyn EventHandler> = Arc::new(second);

    let mut mapper = HandlerMapper::new();
    mapper.register_handler(&[Topic::StudyCreated, Topic::StageChanged], first.clone());
    mapper.register_handler(&[Topic::StageChanged], second.clone());

    assert!(Arc::ptr_eq(&mapper.map(Topic::StudyCreated).unwrap(), &first));
    assert!(Arc::ptr_eq(&mapper.map(Topic::StageChanged).unwrap(), &second));
    assert!(mapper.map(Topic::RoundFinished).is_none());
}

#[tokio::test]
async fn test_dispatch_results() {
    let (counting, mut rx) = CountingHandler::new();
    let mut mapper = HandlerMapper::new();
    mapper.register_handler(&[Topic::StudyCreated], Arc::new(counting));
    mapper.register_handler(&[Topic::RoundFinished], Arc::new(FailingHandler));
    let mapper = Arc::new(tokio::sync::RwLock::new(mapper));

    let ok = Arc::new(make_event(Topic::StudyCreated));
    assert_eq!(dispatch(&mapper, &ok).await, DispatchResult::Success);
    assert_eq!(rx.recv().await.unwrap().id, ok.id);

    let failing = Arc::new(make_event(Topic::RoundFinished));
    assert_eq!(dispatch(&mapper, &failing).await, DispatchResult::HandlerFailed);

    let unrouted = Arc::new(make_event(Topic::SettingsUpdated));
    assert_eq!(dispatch(&mapper, &unrouted).await, DispatchResult::Unhandled);
}

#[tokio::test]
async fn test_process_message_requires_topic_header() {
    let (counting, _rx) = CountingHandler::new();
    let count = counting.count();
    let mut mapper = HandlerMapper::new();
    mapper.register_all(Arc::new(counting));
    let mapper = Arc::new(tokio::sync::RwLock::new(mapper));
    let payload = make_event(Topic::MemberRegistered).to_json().unwrap();

    let result = process_message(None, &payload, &mapper).await;
    assert_eq!(result, DispatchResult::MissingTopic);
    assert!(!result.should_ack());
    assert!(!result.should_requeue());

    let result = process_message(Some("study.member.registered"), b"not json", &mapper).await;
    assert_eq!(result, DispatchResult::DecodeError);

    let result = process_message(Some("study.member.registered"), &payload, &mapper).await;
    assert_eq!(result, DispatchResult::Success);
    assert!(result.should_ack());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dispatch_result_ack_policy() {
    assert!(DispatchResult::Success.should_ack());
    assert!(DispatchResult::Unhandled.should_ack());
    assert!(!DispatchResult::HandlerFailed.should_ack());
    assert!(DispatchResult::HandlerFailed.should_requeue());
    assert!(!DispatchResult::DecodeError.should_requeue());
}

#[tokio::test(start_paused = true)]
async fn test_reliable_publisher_retries_then_succeeds() {
    let bus = Arc::new(MockEventBus::new());
    bus.fail_next(3);
    let publisher = ReliablePublisher::new(
        bus.clone(),
        Duration::from_millis(500),
        Duration::from_secs(5),
    );

    let report = publisher
        .publish(Arc::new(make_event(Topic::StageChanged)))
        .await
        .unwrap();

    assert_eq!(report, PublishReport { attempts: 4 });
    assert_eq!(bus.published_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reliable_publisher_gives_up_at_deadline() {
    let bus = Arc::new(MockEventBus::new());
    bus.fail_next(usize::MAX);
    let publisher = ReliablePublisher::new(
        bus.clone(),
        Duration::from_millis(500),
        Duration::from_secs(5),
    );

    let started = tokio::time::Instant::now();
    let err = publisher
        .publish(Arc::new(make_event(Topic::StageChanged)))
        .await
        .unwrap_err();

    match err {
        BusError::PublishFailed { attempts, .. } => {
            assert!((10..=12).contains(&attempts), "attempts = {attempts}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(started.elapsed() <= Duration::from_secs(5));
    assert_eq!(bus.published_count().await, 0);
}

#[tokio::test]
async fn test_init_bus_channel() {
    let bus = init_bus(&MessagingConfig::default()).await.unwrap();
    bus.publish(Arc::new(make_event(Topic::StudyCreated)))
        .await
        .unwrap();
}
