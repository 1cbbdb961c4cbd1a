//! Wall-clock helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as nanoseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Convert epoch milliseconds to nanoseconds, saturating on overflow
pub fn millis_to_ns(millis: u64) -> u64 {
    millis.saturating_mul(1_000_000)
}
