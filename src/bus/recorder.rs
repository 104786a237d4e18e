//! Handler that writes received events to the log.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use super::{EventHandler, Result, StudyEvent};

/// Logs every event it receives.
#[derive(Debug, Default, Clone)]
pub struct LoggingRecorder;

impl EventHandler for LoggingRecorder {
    fn handle(&self, event: Arc<StudyEvent>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            info!(
                topic = %event.topic,
                event_id = %event.id,
                group_id = %event.group_id,
                round_id = %event.round_id,
                stage = %event.stage.as_str(),
                actor_id = %event.actor_id,
                description = %event.description,
                occurred_at = %event.occurred_at,
                "Study event"
            );
            Ok(())
        })
    }
}
