//! SQLite implementation of the study store.

mod study_store;

pub use study_store::SqliteStudyStore;
