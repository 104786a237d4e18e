//! In-memory channel-based event bus for standalone mode.
//!
//! Uses tokio broadcast channels for pub/sub within a single process.
//! Ideal for local development and testing without external dependencies.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};

use super::{dispatch, EventBus, HandlerMapper, Result, StudyEvent};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// Configuration for channel event bus.
#[derive(Clone, Debug, Default)]
pub struct ChannelConfig {
    /// Topic filter for subscribers.
    /// - `None` or `Some("#")` matches all topics
    /// - `Some("study.member")` matches every member topic
    pub topic_filter: Option<String>,
}

impl ChannelConfig {
    /// Create config for publishing only.
    pub fn publisher() -> Self {
        Self { topic_filter: None }
    }

    /// Create config for subscribing to a topic prefix.
    pub fn subscriber(topic: impl Into<String>) -> Self {
        Self {
            topic_filter: Some(topic.into()),
        }
    }

    /// Create config for subscribing to all topics.
    pub fn subscriber_all() -> Self {
        Self {
            topic_filter: Some("#".to_string()),
        }
    }
}

/// Check if a topic matches a filter pattern.
///
/// Matching rules:
/// - "#" matches all topics
/// - Exact match: "study.created" matches "study.created"
/// - Hierarchical: "study.member" matches "study.member.registered"
fn topic_matches(topic: &str, filter: &str) -> bool {
    if filter == "#" {
        return true;
    }
    if topic == filter {
        return true;
    }
    topic.starts_with(filter) && topic[filter.len()..].starts_with('.')
}

/// In-memory event bus using tokio broadcast channels.
///
/// Events are published to a broadcast channel and received by every
/// consuming bus that shares the sender. Topic filtering is done on the
/// subscriber side.
pub struct ChannelEventBus {
    sender: broadcast::Sender<Arc<StudyEvent>>,
    config: ChannelConfig,
    mapper: Arc<RwLock<HandlerMapper>>,
    /// Flag indicating if consumer task is running.
    consuming: Arc<RwLock<bool>>,
}

impl ChannelEventBus {
    /// Create a new channel event bus.
    pub fn new(config: ChannelConfig) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);

        info!(
            topic_filter = ?config.topic_filter,
            "Channel event bus initialized"
        );

        Self {
            sender,
            config,
            mapper: Arc::new(RwLock::new(HandlerMapper::new())),
            consuming: Arc::new(RwLock::new(false)),
        }
    }

    /// Create a publisher-only bus instance.
    pub fn publisher() -> Self {
        Self::new(ChannelConfig::publisher())
    }

    /// Create a subscriber bus for a topic prefix.
    pub fn subscriber(topic: impl Into<String>) -> Self {
        Self::new(ChannelConfig::subscriber(topic))
    }

    /// Create a subscriber bus for all topics.
    pub fn subscriber_all() -> Self {
        Self::new(ChannelConfig::subscriber_all())
    }

    /// Create a new bus that shares the same channel but has different config.
    pub fn with_config(&self, config: ChannelConfig) -> Self {
        Self {
            sender: self.sender.clone(),
            config,
            mapper: Arc::new(RwLock::new(HandlerMapper::new())),
            consuming: Arc::new(RwLock::new(false)),
        }
    }

    /// Raw receiver for callers that want the event stream directly.
    pub fn receiver(&self) -> broadcast::Receiver<Arc<StudyEvent>> {
        self.sender.subscribe()
    }

    async fn start_consuming_impl(&self) -> Result<()> {
        {
            let mut consuming = self.consuming.write().await;
            if *consuming {
                return Ok(());
            }
            *consuming = true;
        }

        let mut receiver = self.sender.subscribe();
        let mapper = self.mapper.clone();
        let topic_filter = self.config.topic_filter.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let matches = match &topic_filter {
                            None => true,
                            Some(filter) => topic_matches(event.topic.as_str(), filter),
                        };
                        if !matches {
                            continue;
                        }

                        debug!(topic = %event.topic, event_id = %event.id, "Received event via channel");
                        dispatch(&mapper, &event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        error!(skipped = n, "Channel consumer lagged, skipped messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Channel closed, stopping consumer");
                        break;
                    }
                }
            }
        });

        info!(
            topic_filter = ?self.config.topic_filter,
            "Channel consumer started"
        );

        Ok(())
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(topic = %event.topic))]
    async fn publish(&self, event: Arc<StudyEvent>) -> Result<()> {
        // No receivers is fine for publish-only setups.
        match self.sender.send(event) {
            Ok(receivers) => debug!(receivers, "Published event to channel"),
            Err(_) => debug!("Published event (no receivers)"),
        }
        Ok(())
    }

    async fn subscribe(&self, mapper: HandlerMapper) -> Result<()> {
        let count = {
            let mut current = self.mapper.write().await;
            current.merge(mapper);
            current.topics().count()
        };

        info!(topic_count = count, "Handlers subscribed to channel bus");

        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        self.start_consuming_impl().await
    }
}
