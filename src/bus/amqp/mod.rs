//! AMQP (RabbitMQ) event bus implementation.
//!
//! Uses a topic exchange; the routing key is the event topic. The topic is
//! also sent in the `x-event-topic` header, which consumers route on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, Instrument};

use super::{process_message, BusError, EventBus, HandlerMapper, Result, StudyEvent, TOPIC_HEADER};

/// Default exchange name for study events.
const EVENTS_EXCHANGE: &str = "study.events";

/// Configuration for AMQP connection.
#[derive(Clone, Debug)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    pub url: String,
    /// Exchange name for publishing events.
    pub exchange: String,
    /// Queue name for consuming (used by subscribers).
    pub queue: Option<String>,
    /// Routing key pattern for binding (e.g., "study.member.*").
    pub routing_key: Option<String>,
}

impl AmqpConfig {
    /// Create config for publishing only.
    pub fn publisher(url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            queue: None,
            routing_key: None,
        }
    }

    /// Create config for consuming from `queue` bound with `binding`.
    pub fn subscriber(
        url: impl Into<String>,
        exchange: impl Into<String>,
        queue: impl Into<String>,
        binding: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            queue: Some(queue.into()),
            routing_key: Some(binding.into()),
        }
    }

    /// Create config for consuming every study event.
    pub fn subscriber_all(url: impl Into<String>, queue: impl Into<String>) -> Self {
        Self::subscriber(url, EVENTS_EXCHANGE, queue, "#")
    }
}

/// AMQP event bus implementation using RabbitMQ.
pub struct AmqpEventBus {
    pool: Pool,
    config: AmqpConfig,
    mapper: Arc<RwLock<HandlerMapper>>,
}

impl AmqpEventBus {
    /// Create a new AMQP event bus.
    pub async fn new(config: AmqpConfig) -> Result<Self> {
        let manager = Manager::new(config.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BusError::Connection(format!("Failed to create pool: {}", e)))?;

        let conn = pool
            .get()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect: {}", e)))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(format!("Failed to declare exchange: {}", e)))?;

        info!(
            exchange = %config.exchange,
            url = %config.url,
            "Connected to AMQP"
        );

        Ok(Self {
            pool,
            config,
            mapper: Arc::new(RwLock::new(HandlerMapper::new())),
        })
    }

    /// Get a channel from the pool.
    async fn get_channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))
    }

    /// Get a channel in publisher-confirm mode.
    async fn publish_channel(&self) -> Result<Channel> {
        let channel = self.get_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BusError::Connection(format!("Failed to enable confirms: {}", e)))?;
        Ok(channel)
    }

    fn topic_headers(event: &StudyEvent) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(
            TOPIC_HEADER.into(),
            AMQPValue::LongString(event.topic.as_str().to_string().into()),
        );
        headers
    }

    /// Declare queue, bind to exchange, and start consuming messages.
    /// Spawns a background task that reconnects on failure.
    async fn consume(&self) -> Result<()> {
        let queue = self
            .config
            .queue
            .clone()
            .ok_or_else(|| BusError::Subscribe("No queue configured".to_string()))?;

        let routing_key = self
            .config
            .routing_key
            .clone()
            .ok_or_else(|| BusError::Subscribe("No routing key configured".to_string()))?;

        let exchange = self.config.exchange.clone();
        let pool = self.pool.clone();
        let mapper = self.mapper.clone();

        tokio::spawn(async move {
            Self::consume_with_reconnect(pool, exchange, queue, routing_key, mapper).await;
        });

        Ok(())
    }

    /// Consumer loop with reconnection and exponential backoff with jitter.
    async fn consume_with_reconnect(
        pool: Pool,
        exchange: String,
        queue: String,
        routing_key: String,
        mapper: Arc<RwLock<HandlerMapper>>,
    ) {
        use futures::StreamExt;

        let backoff_builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();

        let mut backoff_iter = backoff_builder.build();

        loop {
            match Self::setup_consumer(&pool, &exchange, &queue, &routing_key).await {
                Ok(mut consumer) => {
                    info!(
                        queue = %queue,
                        routing_key = %routing_key,
                        "Consumer connected, processing messages"
                    );
                    backoff_iter = backoff_builder.build();

                    while let Some(delivery) = consumer.next().await {
                        match delivery {
                            Ok(delivery) => {
                                Self::process_delivery(delivery, &mapper).await;
                            }
                            Err(e) => {
                                error!(error = %e, "Consumer delivery error, will reconnect");
                                break;
                            }
                        }
                    }

                    info!(queue = %queue, "Consumer stream ended, reconnecting...");
                }
                Err(e) => {
                    let delay = backoff_iter.next().unwrap_or(Duration::from_secs(30));
                    error!(
                        error = %e,
                        backoff_ms = %delay.as_millis(),
                        queue = %queue,
                        "Failed to set up consumer, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            let delay = backoff_iter.next().unwrap_or(Duration::from_secs(30));
            tokio::time::sleep(delay).await;
        }
    }

    /// Set up consumer channel, queue, and bindings.
    async fn setup_consumer(
        pool: &Pool,
        exchange: &str,
        queue: &str,
        routing_key: &str,
    ) -> Result<lapin::Consumer> {
        let conn = pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to declare queue: {}", e)))?;

        channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to bind queue: {}", e)))?;

        info!(
            queue = %queue,
            routing_key = %routing_key,
            "Bound queue to exchange"
        );

        let consumer = channel
            .basic_consume(
                queue,
                "study-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))?;

        Ok(consumer)
    }

    /// Process a single delivery from the consumer.
    async fn process_delivery(
        delivery: lapin::message::Delivery,
        mapper: &Arc<RwLock<HandlerMapper>>,
    ) {
        let topic = header_topic(&delivery.properties);
        let consume_span = tracing::info_span!(
            "bus.consume",
            routing_key = %delivery.routing_key,
            topic = topic.as_deref().unwrap_or("")
        );

        let result = process_message(topic.as_deref(), &delivery.data, mapper)
            .instrument(consume_span)
            .await;

        if result.should_ack() {
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!(error = %e, "Failed to ack message");
            }
        } else {
            debug!(?result, "Rejecting delivery");
            let options = BasicNackOptions {
                requeue: result.should_requeue(),
                ..Default::default()
            };
            if let Err(e) = delivery.nack(options).await {
                error!(error = %e, "Failed to nack message");
            }
        }
    }
}

/// Only a broker ack counts as delivered.
fn confirmation_result(confirmation: Confirmation) -> Result<()> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(BusError::Publish(
            "Broker rejected the message".to_string(),
        )),
        Confirmation::NotRequested => Err(BusError::Publish(
            "Publisher confirms are not enabled on the channel".to_string(),
        )),
    }
}

/// Topic carried in the delivery headers, if any.
fn header_topic(properties: &BasicProperties) -> Option<String> {
    let headers = properties.headers().as_ref()?;
    match headers.inner().get(TOPIC_HEADER)? {
        AMQPValue::LongString(s) => std::str::from_utf8(s.as_bytes()).ok().map(str::to_string),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        _ => None,
    }
}

#[async_trait]
impl EventBus for AmqpEventBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(topic = %event.topic))]
    async fn publish(&self, event: Arc<StudyEvent>) -> Result<()> {
        let routing_key = event.topic.as_str();
        let payload = event.to_json()?;

        let channel = self.publish_channel().await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_headers(Self::topic_headers(&event));

        let confirm = channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?;

        let confirmation = confirm
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;
        confirmation_result(confirmation)?;

        debug!(
            exchange = %self.config.exchange,
            routing_key = %routing_key,
            "Published study event"
        );
        Ok(())
    }

    async fn subscribe(&self, mapper: HandlerMapper) -> Result<()> {
        if self.config.queue.is_none() {
            return Err(BusError::Subscribe(
                "Cannot subscribe: no queue configured. Use AmqpConfig::subscriber()".to_string(),
            ));
        }

        self.mapper.write().await.merge(mapper);
        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        self.consume().await
    }
}
