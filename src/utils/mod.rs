//! Shared helpers for binaries and backends.

pub mod bootstrap;
pub mod retry;
