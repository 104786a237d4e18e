//! Topic-to-handler routing.
//!
//! Every topic maps to at most one handler. Registering a handler for a
//! topic that already has one replaces it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::{EventHandler, StudyEvent, Topic};

/// Header carrying the topic on broker deliveries.
pub const TOPIC_HEADER: &str = "x-event-topic";

/// Routes events to handlers by topic.
#[derive(Clone, Default)]
pub struct HandlerMapper {
    handlers: HashMap<Topic, Arc<dyn EventHandler>>,
}

impl HandlerMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every topic in `topics` to `handler`.
    pub fn register_handler(
        &mut self,
        topics: &[Topic],
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        for topic in topics {
            if self.handlers.insert(*topic, handler.clone()).is_some() {
                debug!(topic = %topic, "Replacing handler");
            }
        }
        self
    }

    /// Route every known topic to `handler`.
    pub fn register_all(&mut self, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.register_handler(&Topic::ALL, handler)
    }

    pub fn map(&self, topic: Topic) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(&topic).cloned()
    }

    pub fn topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.handlers.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fold `other` into this mapper; its registrations win.
    pub fn merge(&mut self, other: HandlerMapper) {
        self.handlers.extend(other.handlers);
    }
}

/// Result of processing a message through the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// The handler succeeded.
    Success,
    /// No handler is registered for the topic.
    Unhandled,
    /// The handler failed; a redelivery may succeed.
    HandlerFailed,
    /// The delivery carried no topic.
    MissingTopic,
    /// The payload could not be decoded.
    DecodeError,
}

impl DispatchResult {
    /// Returns true if the message should be acknowledged.
    pub fn should_ack(&self) -> bool {
        matches!(self, Self::Success | Self::Unhandled)
    }

    /// Returns true if a rejected message should go back on the queue.
    pub fn should_requeue(&self) -> bool {
        matches!(self, Self::HandlerFailed)
    }
}

/// Hand `event` to the handler registered for its topic.
pub async fn dispatch(mapper: &Arc<RwLock<HandlerMapper>>, event: &Arc<StudyEvent>) -> DispatchResult {
    let handler = mapper.read().await.map(event.topic);
    let Some(handler) = handler else {
        debug!(topic = %event.topic, "No handler registered for topic");
        return DispatchResult::Unhandled;
    };

    match handler.handle(Arc::clone(event)).await {
        Ok(()) => DispatchResult::Success,
        Err(e) => {
            error!(topic = %event.topic, event_id = %event.id, error = %e, "Handler failed");
            DispatchResult::HandlerFailed
        }
    }
}

/// Process a raw broker delivery.
///
/// `topic` is the value of the [`TOPIC_HEADER`] header, if present.
pub async fn process_message(
    topic: Option<&str>,
    payload: &[u8],
    mapper: &Arc<RwLock<HandlerMapper>>,
) -> DispatchResult {
    let Some(topic) = topic else {
        warn!("Delivery without {} header", TOPIC_HEADER);
        return DispatchResult::MissingTopic;
    };
    if topic.parse::<Topic>().is_err() {
        debug!(%topic, "Delivery for unknown topic");
        return DispatchResult::Unhandled;
    }

    match StudyEvent::from_json(payload) {
        Ok(event) => dispatch(mapper, &Arc::new(event)).await,
        Err(e) => {
            error!(%topic, error = %e, "Failed to decode study event");
            DispatchResult::DecodeError
        }
    }
}
