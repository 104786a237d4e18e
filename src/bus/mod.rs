//! Event bus for study notifications.
//!
//! This module contains:
//! - `EventBus` trait: event delivery to collaborators
//! - `EventHandler` trait and `HandlerMapper`: topic-routed consumption
//! - `ReliablePublisher`: at-least-once publication with bounded retry
//! - Bus configuration types
//! - Implementations: in-process channel, AMQP (RabbitMQ), Mock

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod channel;
mod event;
mod mapper;
pub mod mock;
mod recorder;
mod reliable;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::{AmqpConfig, AmqpEventBus};
pub use channel::{ChannelConfig, ChannelEventBus};
pub use event::{StudyEvent, Topic};
pub use mapper::{dispatch, process_message, DispatchResult, HandlerMapper, TOPIC_HEADER};
pub use mock::MockEventBus;
pub use recorder::LoggingRecorder;
pub use reliable::{PublishReport, ReliablePublisher};

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Handler for '{topic}' failed: {message}")]
    HandlerFailed { topic: Topic, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publication gave up after {attempts} attempts: {reason}")]
    PublishFailed { attempts: usize, reason: String },

    #[error("Subscribe not supported for this bus type")]
    SubscribeNotSupported,

    #[error("Unknown messaging type: {0}")]
    UnknownBackend(String),
}

/// Handler for processing events from the bus.
pub trait EventHandler: Send + Sync {
    /// Process a study event.
    fn handle(&self, event: Arc<StudyEvent>) -> BoxFuture<'static, Result<()>>;
}

/// Interface for event delivery.
///
/// Implementations:
/// - `ChannelEventBus`: tokio broadcast within one process
/// - `AmqpEventBus`: RabbitMQ via AMQP
/// - `MockEventBus`: in-memory recorder for testing
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to consumers.
    ///
    /// The event is wrapped in Arc so every consumer shares the same
    /// immutable value.
    async fn publish(&self, event: Arc<StudyEvent>) -> Result<()>;

    /// Register topic handlers. Later registrations for a topic win.
    async fn subscribe(&self, mapper: HandlerMapper) -> Result<()>;

    /// Start delivering events to subscribed handlers.
    async fn start_consuming(&self) -> Result<()> {
        Err(BusError::SubscribeNotSupported)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process broadcast channel.
    #[default]
    Channel,
    /// AMQP/RabbitMQ messaging.
    Amqp,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// AMQP-specific configuration.
    pub amqp: AmqpBusConfig,
}

/// AMQP-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpBusConfig {
    /// AMQP connection URL.
    pub url: String,
    /// Topic exchange events are published to.
    pub exchange: String,
    /// Queue to consume from (subscribers only).
    pub queue: Option<String>,
    /// Binding pattern for the queue.
    pub binding: String,
}

impl Default for AmqpBusConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            exchange: "study.events".to_string(),
            queue: None,
            binding: "study.#".to_string(),
        }
    }
}

/// Publication retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Delay between publish attempts, in milliseconds.
    pub retry_interval_ms: u64,
    /// Overall publication deadline, in milliseconds.
    pub deadline_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 500,
            deadline_ms: 5000,
        }
    }
}

impl PublishConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize event bus based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: always available
/// - AMQP: `--features amqp`
pub async fn init_bus(config: &MessagingConfig) -> Result<Arc<dyn EventBus>> {
    match config.messaging_type {
        MessagingType::Channel => {
            info!(messaging_type = "channel", "Event bus initialized");
            Ok(Arc::new(ChannelEventBus::subscriber_all()))
        }
        MessagingType::Amqp => {
            #[cfg(feature = "amqp")]
            {
                let amqp_config = match &config.amqp.queue {
                    Some(queue) => AmqpConfig::subscriber(
                        &config.amqp.url,
                        &config.amqp.exchange,
                        queue,
                        &config.amqp.binding,
                    ),
                    None => AmqpConfig::publisher(&config.amqp.url, &config.amqp.exchange),
                };

                let bus = AmqpEventBus::new(amqp_config).await?;
                info!(messaging_type = "amqp", "Event bus initialized");
                Ok(Arc::new(bus))
            }

            #[cfg(not(feature = "amqp"))]
            {
                Err(BusError::UnknownBackend(
                    "AMQP support requires the 'amqp' feature".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests;
