//! study-recorder: event log consumer
//!
//! Subscribes to every study topic and writes each event to the log.
//! Useful for debugging and auditing the event flow of a deployment.
//!
//! ## Architecture
//! ```text
//! [StudyService] --(EventBus)--> [study-recorder]
//!                                       |
//!                                       v
//!                                    tracing
//! ```
//!
//! ## Configuration
//! - STUDY_CONFIG: path to a YAML config file (optional)
//! - STUDY__MESSAGING__TYPE: `channel` or `amqp`
//! - STUDY_LOG: tracing filter (default: info)

use std::sync::Arc;

use tracing::info;

use study_coordinator::bus::{init_bus, HandlerMapper, LoggingRecorder, MessagingType};
use study_coordinator::config::Config;
use study_coordinator::utils::bootstrap::init_tracing;

const DEFAULT_QUEUE: &str = "study-recorder";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = Config::load(None)?;
    if config.messaging.messaging_type == MessagingType::Amqp && config.messaging.amqp.queue.is_none()
    {
        config.messaging.amqp.queue = Some(DEFAULT_QUEUE.to_string());
    }

    let bus = init_bus(&config.messaging).await?;

    let mut mapper = HandlerMapper::new();
    mapper.register_all(Arc::new(LoggingRecorder));
    let topics = mapper.topics().count();

    bus.subscribe(mapper).await?;
    bus.start_consuming().await?;

    info!(
        messaging_type = ?config.messaging.messaging_type,
        topics,
        "study-recorder started"
    );

    tokio::signal::ctrl_c().await?;
    info!("study-recorder shutting down");

    Ok(())
}
