//! Scheduler cadence helpers for the periodic sync trigger.

use std::time::Duration;

use rand::Rng;

/// Maximum jitter (seconds) added to each scheduler tick.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 30;

/// Minimum delay between ticks, whatever the configured interval.
pub const MIN_SYNC_INTERVAL_SECS: u64 = 60;

/// Delay until the next scheduled run: the configured interval plus jitter.
pub fn next_tick_delay(interval_minutes: u32) -> Duration {
    let base_secs = u64::from(interval_minutes)
        .saturating_mul(60)
        .max(MIN_SYNC_INTERVAL_SECS);
    let jitter_ms = rand::thread_rng().gen_range(0..=SYNC_INTERVAL_JITTER_SECS * 1000);
    Duration::from_millis(base_secs.saturating_mul(1000).saturating_add(jitter_ms))
}
