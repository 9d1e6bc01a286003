use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch; a clock set before 1970 reads as 0
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Eviction cutoff: peers whose last announce is strictly before this are stale
pub fn staleness_cutoff(now: i64, window_secs: i64) -> i64 {
    now.saturating_sub(window_secs)
}
