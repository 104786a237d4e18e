//! Retry utilities: backoff builders.
//!
//! Uses `backon` for backoff. Store conflicts use exponential backoff with
//! jitter. Event publication uses a constant interval bounded by a deadline,
//! and cache population a constant delay with a fixed attempt count.

use std::time::Duration;

use backon::{ConstantBuilder, ExponentialBuilder};

/// Default number of retries after a store write conflict.
pub const DEFAULT_STORE_RETRIES: usize = 10;

/// Backoff for store write conflicts.
///
/// - Min delay: 10ms
/// - Max delay: 2s
/// - Max retries: `max_retries`
/// - Jitter enabled
pub fn store_backoff(max_retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(max_retries)
        .with_jitter()
}

/// Backoff for event publication.
///
/// Fixed `interval` between attempts, with enough attempts to cover
/// `deadline`. The caller still enforces the deadline itself.
pub fn publish_backoff(interval: Duration, deadline: Duration) -> ConstantBuilder {
    let interval_ms = interval.as_millis().max(1);
    let times = (deadline.as_millis() / interval_ms) as usize + 1;
    ConstantBuilder::default()
        .with_delay(interval)
        .with_max_times(times)
}

/// Backoff for cache population: `attempts` writes in total, `delay` apart.
pub fn populate_backoff(delay: Duration, attempts: usize) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(delay)
        .with_max_times(attempts.saturating_sub(1))
}
