//! Shared storage integration tests.
//!
//! Tests the StudyStore contract. Each implementation module imports these
//! test functions and runs them through `run_study_store_tests!`.

pub mod study_store_tests;
