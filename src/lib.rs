//! Study Coordinator
//!
//! Coordination core for recurring group study rounds. A study walks its
//! ongoing round through a fixed stage cycle (registration, submission,
//! presentation, review) while members register, submit material, review
//! each other and post reflections.
//!
//! Collaborators talk to [`services::StudyService`]. It serializes commands
//! per study, persists through a [`storage::StudyStore`], keeps the current
//! round in a [`cache::RoundCache`] and announces every committed change on
//! an [`bus::EventBus`].

pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod machine;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ErrorKind, Result, StudyError};
pub use model::{Aggregate, Member, Round, Stage, Study};
pub use services::{RequestContext, ServiceOptions, StudyService, StudyUpdate};
