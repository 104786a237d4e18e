//! At-least-once publication.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{info, warn};

use super::{BusError, EventBus, PublishConfig, Result, StudyEvent};
use crate::utils::retry::publish_backoff;

/// Successful publication summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Publish calls it took, the successful one included.
    pub attempts: usize,
}

/// Retries publication at a fixed interval until it succeeds or the
/// deadline passes.
///
/// Every attempt and its outcome is logged. Consumers may see an event more
/// than once.
#[derive(Clone)]
pub struct ReliablePublisher {
    bus: Arc<dyn EventBus>,
    interval: Duration,
    deadline: Duration,
}

impl ReliablePublisher {
    pub fn new(bus: Arc<dyn EventBus>, interval: Duration, deadline: Duration) -> Self {
        Self {
            bus,
            interval,
            deadline,
        }
    }

    pub fn from_config(bus: Arc<dyn EventBus>, config: &PublishConfig) -> Self {
        Self::new(bus, config.retry_interval(), config.deadline())
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    #[tracing::instrument(
        name = "bus.publish_reliable",
        skip_all,
        fields(topic = %event.topic, event_id = %event.id)
    )]
    pub async fn publish(&self, event: Arc<StudyEvent>) -> Result<PublishReport> {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let bus = &self.bus;
        let event = &event;

        let run = (move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match bus.publish(Arc::clone(event)).await {
                Ok(()) => {
                    info!(attempt, "Event published");
                    Ok(())
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Event publish attempt failed");
                    Err(e)
                }
            }
        })
        .retry(publish_backoff(self.interval, self.deadline));

        let outcome = tokio::time::timeout(self.deadline, run).await;
        let attempts = counter.load(Ordering::SeqCst);

        match outcome {
            Ok(Ok(())) => Ok(PublishReport { attempts }),
            Ok(Err(e)) => Err(BusError::PublishFailed {
                attempts,
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!(attempts, deadline = ?self.deadline, "Event publication deadline exceeded");
                Err(BusError::PublishFailed {
                    attempts,
                    reason: format!("deadline of {:?} exceeded", self.deadline),
                })
            }
        }
    }
}
