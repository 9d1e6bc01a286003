use crate::models::peer::Peer;

/// Bytes credited to a single announce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficDelta {
    pub uploaded: u64,
    pub downloaded: u64,
}

/// Compute this announce's contribution against the previous snapshot.
///
/// A first announce has no history and contributes nothing. A reported total
/// below the snapshot (client restart) contributes zero rather than a negative amount.
pub fn compute_delta(previous: Option<&Peer>, uploaded: u64, downloaded: u64) -> TrafficDelta {
    match previous {
        Some(prev) => TrafficDelta {
            uploaded: uploaded.saturating_sub(prev.snapshot_uploaded),
            downloaded: downloaded.saturating_sub(prev.snapshot_downloaded),
        },
        None => TrafficDelta::default(),
    }
}

/// True when the client reported lower totals than last time
pub fn counters_reset(previous: &Peer, uploaded: u64, downloaded: u64) -> bool {
    uploaded < previous.snapshot_uploaded || downloaded < previous.snapshot_downloaded
}
