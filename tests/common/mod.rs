//! Shared utilities for integration tests.
//!
//! Builds a `StudyService` over the in-memory store, the in-memory round
//! cache and the recording mock bus.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use study_coordinator::bus::MockEventBus;
use study_coordinator::cache::MemoryRoundCache;
use study_coordinator::services::{RequestContext, ServiceOptions, StudyService};
use study_coordinator::storage::InMemoryStudyStore;

pub const MANAGER: &str = "manager";

/// Service plus handles on its collaborators.
pub struct TestApp {
    pub service: Arc<StudyService>,
    pub store: Arc<InMemoryStudyStore>,
    pub cache: Arc<MemoryRoundCache>,
    pub bus: Arc<MockEventBus>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(ServiceOptions {
            publish_interval: Duration::from_millis(20),
            publish_deadline: Duration::from_millis(500),
            populate_delay: Duration::from_millis(10),
            ..ServiceOptions::default()
        })
    }

    pub fn with_options(options: ServiceOptions) -> Self {
        let store = Arc::new(InMemoryStudyStore::new());
        let cache = Arc::new(MemoryRoundCache::new());
        let bus = Arc::new(MockEventBus::new());
        let service = Arc::new(StudyService::new(
            store.clone(),
            cache.clone(),
            bus.clone(),
            options,
        ));
        Self {
            service,
            store,
            cache,
            bus,
        }
    }
}

/// Context for the study manager of `group_id`.
pub fn manager(group_id: &str) -> RequestContext {
    RequestContext::new(group_id, MANAGER)
}

/// Context for a participant of `group_id`.
pub fn member(group_id: &str, member_id: &str) -> RequestContext {
    RequestContext::new(group_id, member_id)
}
