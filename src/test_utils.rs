//! Test utilities shared by unit tests and, with the `test-utils` feature,
//! by downstream crates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::bus::{BusError, EventHandler, StudyEvent, Topic};
use crate::model::Study;

/// Build an event for a throwaway study.
pub fn make_event(topic: Topic) -> StudyEvent {
    let study = Study::new("guild", "manager");
    StudyEvent::new(topic, &study, "manager").with_description(topic.as_str())
}

/// Handler that counts received events and forwards them to a channel.
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<Arc<StudyEvent>>,
}

impl CountingHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<StudyEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Self {
            count: Arc::new(AtomicUsize::new(0)),
            tx,
        };
        (handler, rx)
    }

    pub fn count(&self) -> Arc<AtomicUsize> {
        self.count.clone()
    }
}

impl EventHandler for CountingHandler {
    fn handle(&self, event: Arc<StudyEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        let count = self.count.clone();
        let tx = self.tx.clone();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(event);
            Ok(())
        })
    }
}

/// Handler that always fails.
pub struct FailingHandler;

impl EventHandler for FailingHandler {
    fn handle(&self, event: Arc<StudyEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        Box::pin(async move {
            Err(BusError::HandlerFailed {
                topic: event.topic,
                message: "test failure".to_string(),
            })
        })
    }
}
