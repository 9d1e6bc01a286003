use rand::seq::SliceRandom;
use std::net::IpAddr;
use tracing::{debug, error};

use super::{admit, bounded};
use crate::accounting::traffic::{compute_delta, counters_reset, TrafficDelta};
use crate::core::error::{StoreError, TrackerError};
use crate::core::state::AppState;
use crate::models::peer::{AnnounceEvent, InfoHash, Peer, PeerId};
use crate::utils::time::current_timestamp;
use crate::wal::wal::{append, WalOperation};

/// Transport-independent announce
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    /// Address the request arrived from; admission is decided on this
    pub remote_ip: IpAddr,
    /// Address the peer is registered at
    pub ip: IpAddr,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: Option<AnnounceEvent>,
    /// `None` uses the configured default
    pub numwant: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AnnounceOutcome {
    pub interval: u32,
    /// IPv4 peers to hand back, already filtered, shuffled and truncated
    pub peers: Vec<Peer>,
    /// Swarm composition at the time of the read, including the announcing peer
    pub seeders: u32,
    pub leechers: u32,
    pub delta: TrafficDelta,
}

/// Run one announce through admission, mutation and peer selection.
pub async fn announce(
    state: &AppState,
    request: AnnounceRequest,
) -> Result<AnnounceOutcome, TrackerError> {
    state.metrics.increment_announces();

    let result = process(state, &request).await;

    match &result {
        Ok(_) => state.metrics.increment_successful(),
        Err(_) => state.metrics.increment_failed(),
    }

    result
}

async fn process(
    state: &AppState,
    request: &AnnounceRequest,
) -> Result<AnnounceOutcome, TrackerError> {
    admit(state, request.remote_ip).await?;

    let timeout = state.config.server.request_timeout();
    let store = &state.swarm_store;

    let delta = if request.event == Some(AnnounceEvent::Stopped) {
        let removed = bounded(
            "delete",
            timeout,
            store.delete(request.info_hash, request.peer_id),
        )
        .await
        .map_err(|e| backend_failure(request, "delete", e))?;

        debug!(
            info_hash = %request.info_hash,
            peer_id = %request.peer_id,
            removed,
            "Peer stopped"
        );

        TrafficDelta::default()
    } else {
        let peer = Peer::new(
            request.peer_id,
            request.info_hash,
            request.ip,
            request.port,
            request.uploaded,
            request.downloaded,
            request.left,
            current_timestamp(),
        );

        let previous = bounded("upsert", timeout, store.upsert(peer))
            .await
            .map_err(|e| backend_failure(request, "upsert", e))?;

        let delta = compute_delta(previous.as_ref(), request.uploaded, request.downloaded);

        if let Some(prev) = &previous {
            if counters_reset(prev, request.uploaded, request.downloaded) {
                debug!(
                    info_hash = %request.info_hash,
                    peer_id = %request.peer_id,
                    previous_uploaded = prev.snapshot_uploaded,
                    previous_downloaded = prev.snapshot_downloaded,
                    uploaded = request.uploaded,
                    downloaded = request.downloaded,
                    "Client counters went backwards, crediting zero"
                );
            }
        }

        state.metrics.record_traffic(delta.uploaded, delta.downloaded);

        if request.event == Some(AnnounceEvent::Completed) {
            record_completion(state, request).await?;
        }

        delta
    };

    let swarm = bounded("list_peers", timeout, store.list_peers(request.info_hash))
        .await
        .map_err(|e| backend_failure(request, "list_peers", e))?;

    let seeders = swarm.iter().filter(|p| p.is_seeder()).count() as u32;
    let leechers = swarm.len() as u32 - seeders;

    let peers = select_peers(
        swarm,
        request.peer_id,
        state.config.tracker.exclude_self,
        numwant(state, request.numwant),
    );

    debug!(
        info_hash = %request.info_hash,
        peer_id = %request.peer_id,
        ip = %request.ip,
        uploaded_delta = delta.uploaded,
        downloaded_delta = delta.downloaded,
        returned_peers = peers.len(),
        "Announce processed"
    );

    Ok(AnnounceOutcome {
        interval: state.config.tracker.announce_interval,
        peers,
        seeders,
        leechers,
        delta,
    })
}

async fn record_completion(state: &AppState, request: &AnnounceRequest) -> Result<(), TrackerError> {
    let count = bounded(
        "record_completed",
        state.config.server.request_timeout(),
        state.swarm_store.record_completed(request.info_hash),
    )
    .await
    .map_err(|e| backend_failure(request, "record_completed", e))?;

    // The in-memory counter is already bumped; a WAL failure only costs durability
    if let Err(e) = append(
        &state.wal,
        WalOperation::Completed {
            info_hash: request.info_hash,
        },
    )
    .await
    {
        error!(
            info_hash = %request.info_hash,
            error = %e,
            "Failed to log completion to WAL"
        );
    }

    debug!(info_hash = %request.info_hash, completed = count, "Download completed");
    Ok(())
}

fn numwant(state: &AppState, requested: Option<u32>) -> usize {
    let tracker = &state.config.tracker;
    requested
        .unwrap_or(tracker.default_numwant)
        .min(tracker.max_numwant) as usize
}

/// Drop the caller (when configured) and every peer the compact encoding
/// cannot carry, shuffle, and keep at most `limit` peers
fn select_peers(mut swarm: Vec<Peer>, caller: PeerId, exclude_self: bool, limit: usize) -> Vec<Peer> {
    swarm.retain(|peer| peer.ip.is_ipv4() && !(exclude_self && peer.peer_id == caller));

    swarm.shuffle(&mut rand::rng());
    swarm.truncate(limit);
    swarm
}

fn backend_failure(request: &AnnounceRequest, operation: &'static str, e: StoreError) -> TrackerError {
    error!(
        operation,
        info_hash = %request.info_hash,
        peer_id = %request.peer_id,
        retryable = e.is_retryable(),
        error = %e,
        "Swarm store operation failed"
    );
    TrackerError::Backend(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::stores::swarm_store::SwarmStore;
    use std::net::Ipv4Addr;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const HASH: InfoHash = InfoHash([0xaa; 20]);

    fn request(id: u8, uploaded: u64, left: u64, event: Option<AnnounceEvent>) -> AnnounceRequest {
        AnnounceRequest {
            info_hash: HASH,
            peer_id: PeerId([id; 20]),
            remote_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, id)),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, id)),
            port: 6881,
            uploaded,
            downloaded: 0,
            left,
            event,
            numwant: None,
        }
    }

    #[tokio::test]
    async fn test_first_announce_has_zero_delta() {
        let (state, _dir) = test_state(test_config());

        let outcome = announce(&state, request(1, 1000, 0, None)).await.unwrap();

        assert_eq!(outcome.delta, TrafficDelta::default());
        assert_eq!(outcome.interval, 1800);
        assert!(outcome.peers.is_empty());
        assert_eq!(outcome.seeders, 1);

        let stored = state.swarm_store.list_peers(HASH).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].snapshot_uploaded, 1000);
    }

    #[tokio::test]
    async fn test_second_announce_credits_difference() {
        let (state, _dir) = test_state(test_config());

        announce(&state, request(1, 1000, 0, None)).await.unwrap();
        let outcome = announce(&state, request(1, 1500, 0, None)).await.unwrap();

        assert_eq!(outcome.delta.uploaded, 500);
        let stored = state.swarm_store.list_peers(HASH).await.unwrap();
        assert_eq!(stored[0].snapshot_uploaded, 1500);
        assert_eq!(state.metrics.uploaded_bytes.load(Ordering::Relaxed), 500);
    }

    #[tokio::test]
    async fn test_counter_reset_credits_zero() {
        let (state, _dir) = test_state(test_config());

        announce(&state, request(1, 5000, 0, None)).await.unwrap();
        let outcome = announce(&state, request(1, 200, 0, None)).await.unwrap();

        assert_eq!(outcome.delta.uploaded, 0);
        let stored = state.swarm_store.list_peers(HASH).await.unwrap();
        assert_eq!(stored[0].snapshot_uploaded, 200);
    }

    #[tokio::test]
    async fn test_exclude_self() {
        let (state, _dir) = test_state(test_config());

        announce(&state, request(1, 0, 0, None)).await.unwrap();
        let outcome = announce(&state, request(2, 0, 100, None)).await.unwrap();

        assert_eq!(outcome.peers.len(), 1);
        assert_eq!(outcome.peers[0].peer_id, PeerId([1; 20]));
        assert_eq!((outcome.seeders, outcome.leechers), (1, 1));
    }

    #[tokio::test]
    async fn test_include_self_when_configured() {
        let mut config = test_config();
        config.tracker.exclude_self = false;
        let (state, _dir) = test_state(config);

        let outcome = announce(&state, request(1, 0, 0, None)).await.unwrap();
        assert_eq!(outcome.peers.len(), 1);
        assert_eq!(outcome.peers[0].peer_id, PeerId([1; 20]));
    }

    #[tokio::test]
    async fn test_stopped_removes_peer() {
        let (state, _dir) = test_state(test_config());

        announce(&state, request(1, 0, 0, None)).await.unwrap();
        announce(&state, request(2, 0, 0, None)).await.unwrap();

        let outcome = announce(&state, request(1, 0, 0, Some(AnnounceEvent::Stopped)))
            .await
            .unwrap();

        assert_eq!(outcome.peers.len(), 1);
        let stored = state.swarm_store.list_peers(HASH).await.unwrap();
        assert!(stored.iter().all(|p| p.peer_id != PeerId([1; 20])));
    }

    #[tokio::test]
    async fn test_stopped_for_unknown_peer_is_noop() {
        let (state, _dir) = test_state(test_config());

        let outcome = announce(&state, request(9, 0, 0, Some(AnnounceEvent::Stopped))).await;
        assert!(outcome.is_ok());
        assert_eq!(state.swarm_store.total_peers(), 0);
    }

    #[tokio::test]
    async fn test_completed_bumps_counter_and_logs() {
        let (state, _dir) = test_state(test_config());

        announce(&state, request(1, 0, 0, Some(AnnounceEvent::Completed)))
            .await
            .unwrap();
        announce(&state, request(1, 0, 0, Some(AnnounceEvent::Stopped)))
            .await
            .unwrap();

        let stats = state.swarm_store.stats(HASH).await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.seeders, 0);

        assert_eq!(
            state.wal.replay().unwrap(),
            vec![WalOperation::Completed { info_hash: HASH }]
        );
    }

    #[tokio::test]
    async fn test_numwant_limits_peers() {
        let mut config = test_config();
        config.tracker.max_numwant = 3;
        let (state, _dir) = test_state(config);

        for id in 1..=10 {
            announce(&state, request(id, 0, 0, None)).await.unwrap();
        }

        let mut req = request(20, 0, 0, None);
        req.numwant = Some(2);
        assert_eq!(announce(&state, req).await.unwrap().peers.len(), 2);

        let mut req = request(21, 0, 0, None);
        req.numwant = Some(500);
        assert_eq!(announce(&state, req).await.unwrap().peers.len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limited_announce_does_not_mutate() {
        let mut config = test_config();
        config.rate_limit.capacity = 1;
        config.rate_limit.refill_per_second = 0.001;
        let (state, _dir) = test_state(config);

        announce(&state, request(1, 0, 0, None)).await.unwrap();
        let second = announce(&state, request(2, 0, 0, None)).await;

        assert!(matches!(second, Err(TrackerError::RateLimited)));
        assert_eq!(state.swarm_store.total_peers(), 1);
        assert_eq!(state.metrics.failed_announces.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_denied_announce_does_not_mutate() {
        let mut config = test_config();
        config.access.denied_ips = vec!["10.0.0.1".to_string()];
        let (state, _dir) = test_state(config);

        let result = announce(&state, request(1, 0, 0, None)).await;

        assert!(matches!(result, Err(TrackerError::AccessDenied)));
        assert_eq!(state.swarm_store.total_peers(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_backend_error() {
        let (state, _dir) = state_with(test_config(), Arc::new(FailingStore::unavailable()));

        let result = announce(&state, request(1, 0, 0, None)).await;
        assert!(matches!(result, Err(TrackerError::Backend(_))));
    }

    #[test]
    fn test_select_peers_respects_limit() {
        let swarm: Vec<Peer> = (1..=5u8)
            .map(|id| {
                Peer::new(
                    PeerId([id; 20]),
                    HASH,
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, id)),
                    6881,
                    0,
                    0,
                    0,
                    0,
                )
            })
            .collect();

        let selected = select_peers(swarm.clone(), PeerId([1; 20]), true, 10);
        assert_eq!(selected.len(), 4);

        let selected = select_peers(swarm, PeerId([1; 20]), false, 2);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_select_peers_skips_ipv6_before_limit() {
        let mut swarm = Vec::new();
        for id in 1..=5u8 {
            swarm.push(Peer::new(
                PeerId([id; 20]),
                HASH,
                IpAddr::V6(std::net::Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, id as u16)),
                6881,
                0,
                0,
                0,
                0,
            ));
            swarm.push(Peer::new(
                PeerId([id + 100; 20]),
                HASH,
                IpAddr::V4(Ipv4Addr::new(10, 0, 1, id)),
                6881,
                0,
                0,
                0,
                0,
            ));
        }

        for _ in 0..20 {
            let selected = select_peers(swarm.clone(), PeerId([0; 20]), true, 5);
            assert_eq!(selected.len(), 5);
            assert!(selected.iter().all(|peer| peer.ip.is_ipv4()));
        }
    }

    #[tokio::test]
    async fn test_mixed_family_swarm_fills_numwant() {
        let (state, _dir) = test_state(test_config());

        for id in 1..=5u8 {
            let mut req = request(id, 0, 0, None);
            req.ip = IpAddr::V6(std::net::Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, id as u16));
            announce(&state, req).await.unwrap();
            announce(&state, request(id + 10, 0, 0, None)).await.unwrap();
        }

        let mut req = request(50, 0, 0, None);
        req.numwant = Some(5);
        let outcome = announce(&state, req).await.unwrap();

        assert_eq!(outcome.peers.len(), 5);
        assert!(outcome.peers.iter().all(|peer| peer.ip.is_ipv4()));
        // Counts still cover the whole swarm
        assert_eq!(outcome.seeders, 11);
    }
}
