use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, warn};

use super::{admit, bounded};
use crate::core::error::TrackerError;
use crate::core::state::AppState;
use crate::models::peer::{InfoHash, SwarmStats};

/// Resolve stats for each requested hash, in request order.
///
/// Duplicates collapse onto their first position. A hash whose lookup fails is
/// left out of the result instead of failing the whole scrape.
pub async fn scrape(
    state: &AppState,
    ip: IpAddr,
    info_hashes: &[InfoHash],
) -> Result<Vec<(InfoHash, SwarmStats)>, TrackerError> {
    state.metrics.increment_scrapes();

    admit(state, ip).await?;

    let timeout = state.config.server.request_timeout();
    let mut seen = HashSet::with_capacity(info_hashes.len());
    let mut files = Vec::with_capacity(info_hashes.len());

    for info_hash in info_hashes {
        if !seen.insert(*info_hash) {
            continue;
        }

        match bounded("stats", timeout, state.swarm_store.stats(*info_hash)).await {
            Ok(stats) => files.push((*info_hash, stats)),
            Err(e) => {
                warn!(
                    info_hash = %info_hash,
                    error = %e,
                    "Stats lookup failed, omitting from scrape"
                );
            }
        }
    }

    debug!(
        ip = %ip,
        requested = info_hashes.len(),
        returned = files.len(),
        "Scrape processed"
    );

    Ok(files)
}
