//! Mock event bus implementation for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use super::{BusError, EventBus, HandlerMapper, Result, StudyEvent, Topic};

/// Mock event bus for testing.
///
/// Records every published event. Can be told to fail the next N publishes.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<StudyEvent>>,
    fail_next: AtomicUsize,
    attempts: AtomicUsize,
    notify: Notify,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publish calls with a connection error.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Publish calls made so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<StudyEvent> {
        self.published.read().await.clone()
    }

    pub async fn topics(&self) -> Vec<Topic> {
        self.published.read().await.iter().map(|e| e.topic).collect()
    }

    pub async fn take_published(&self) -> Vec<StudyEvent> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// Wait until at least `count` events were recorded or `timeout` passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.published_count().await >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, event: Arc<StudyEvent>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.published.write().await.push((*event).clone());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, _mapper: HandlerMapper) -> Result<()> {
        Err(BusError::SubscribeNotSupported)
    }
}
