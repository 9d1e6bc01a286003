use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::bounded;
use crate::core::error::StoreError;
use crate::core::state::AppState;
use crate::utils::time::{current_timestamp, staleness_cutoff};

/// One eviction pass at `now`: stale peers, expired UDP connection IDs and idle
/// per-IP windows. Returns the number of peers removed.
pub async fn sweep_once(state: &AppState, now: i64) -> Result<usize, StoreError> {
    let cutoff = staleness_cutoff(now, state.config.eviction.peer_timeout_secs);

    let removed = bounded(
        "delete_older_than",
        state.config.server.request_timeout(),
        state.swarm_store.delete_older_than(cutoff),
    )
    .await?;

    state.metrics.record_evicted(removed);

    let expired_connections = state.udp_connections.prune(now);

    if let Some(limiter) = &state.keyed_limiter {
        limiter.cleanup_old_entries(now);
    }

    if removed > 0 {
        info!(
            removed_peers = removed,
            expired_connections,
            active_peers = state.swarm_store.total_peers(),
            active_swarms = state.swarm_store.active_swarms(),
            "Peer sweep completed"
        );
    } else {
        debug!(expired_connections, "Peer sweep completed, no stale peers found");
    }

    Ok(removed)
}

/// Spawn the background sweeper; it runs until `shutdown` flips to true.
/// A failed pass is logged and retried on the next tick.
pub fn spawn_sweeper(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.eviction.sweep_interval_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick fires immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = sweep_once(&state, current_timestamp()).await {
                        error!(error = %e, "Peer sweep failed, retrying next interval");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}
