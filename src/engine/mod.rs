pub mod announce;
pub mod scrape;
pub mod sweeper;

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{error, warn};

use crate::core::error::{StoreError, TrackerError};
use crate::core::state::AppState;
use crate::utils::time::current_timestamp;

/// Bound a backend call by the configured request timeout
pub(crate) async fn bounded<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| StoreError::Timeout { operation, after })?
}

/// Access Control, then the global bucket, then the optional per-IP limiter.
/// A per-IP refusal hands the global token back.
pub async fn admit(state: &AppState, ip: IpAddr) -> Result<(), TrackerError> {
    match state.access.is_allowed(ip).await {
        Ok(true) => {}
        Ok(false) => {
            state.metrics.increment_blocked();
            warn!(ip = %ip, "Request from IP not permitted");
            return Err(TrackerError::AccessDenied);
        }
        Err(e) => {
            error!(ip = %ip, error = %e, "Access list lookup failed");
            return Err(e.into());
        }
    }

    if !state.bucket.try_acquire() {
        state.metrics.increment_rate_limited();
        warn!(ip = %ip, "Global rate limit exceeded");
        return Err(TrackerError::RateLimited);
    }

    if let Some(limiter) = &state.keyed_limiter {
        if !limiter.check_and_increment(ip, current_timestamp()) {
            state.bucket.refund();
            state.metrics.increment_rate_limited();
            warn!(ip = %ip, "Per-IP rate limit exceeded");
            return Err(TrackerError::RateLimited);
        }
    }

    Ok(())
}
