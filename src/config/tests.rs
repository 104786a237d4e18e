use std::io::Write;
use std::time::Duration;

use super::*;
use crate::bus::MessagingType;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.storage.storage_type, "sqlite");
    assert_eq!(config.storage.path, "./data/study.db");
    assert_eq!(config.cache.cache_type, "memory");
    assert_eq!(config.messaging.messaging_type, MessagingType::Channel);
    assert_eq!(config.service.request_timeout(), Duration::from_secs(5));
}

#[test]
fn test_parse_yaml() {
    let yaml = r#"
storage:
  type: memory

cache:
  type: redis
  url: redis://cache:6379
  ttl_secs: 60

messaging:
  type: amqp
  amqp:
    url: amqp://rabbit:5672
    queue: study-recorder

publish:
  retry_interval_ms: 250
"#;

    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.storage.storage_type, "memory");
    assert_eq!(config.storage.path, "./data/study.db");
    assert_eq!(config.cache.url, "redis://cache:6379");
    assert_eq!(config.cache.ttl(), Duration::from_secs(60));
    assert_eq!(config.messaging.messaging_type, MessagingType::Amqp);
    assert_eq!(config.messaging.amqp.queue.as_deref(), Some("study-recorder"));
    assert_eq!(config.messaging.amqp.exchange, "study.events");
    assert_eq!(config.publish.retry_interval(), Duration::from_millis(250));
    assert_eq!(config.publish.deadline(), Duration::from_secs(5));
}

#[test]
fn test_load_from_path() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "service:\n  store_retry_attempts: 2\n  request_timeout_ms: 750").unwrap();

    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.service.store_retry_attempts, 2);

    let options = config.service_options();
    assert_eq!(options.store_retries, 2);
    assert_eq!(options.cache_ttl, Duration::from_secs(300));
    assert_eq!(config.service.request_timeout(), Duration::from_millis(750));
}

#[test]
fn test_load_missing_path_fails() {
    assert!(Config::load(Some("/nonexistent/study.yaml")).is_err());
}
