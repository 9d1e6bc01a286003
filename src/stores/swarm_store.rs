use crate::core::error::StoreError;
use crate::models::peer::{InfoHash, Peer, PeerId, SwarmStats};
use async_trait::async_trait;
use dashmap::DashMap;

/// Authoritative registry of peers per info-hash.
///
/// Implementations must make `upsert` and `delete` atomic per `(info_hash, peer_id)`
/// without serializing operations on unrelated keys.
#[async_trait]
pub trait SwarmStore: Send + Sync {
    /// Insert or replace the record for `(peer.info_hash, peer.peer_id)`, returning the prior record.
    async fn upsert(&self, peer: Peer) -> Result<Option<Peer>, StoreError>;

    /// Remove the record if present. Returns whether a record was removed.
    async fn delete(&self, info_hash: InfoHash, peer_id: PeerId) -> Result<bool, StoreError>;

    /// Snapshot of every peer in the swarm, in no particular order.
    async fn list_peers(&self, info_hash: InfoHash) -> Result<Vec<Peer>, StoreError>;

    /// Remove every peer whose `last_announce` is strictly before `cutoff`.
    async fn delete_older_than(&self, cutoff: i64) -> Result<usize, StoreError>;

    /// Seeders, leechers and the completed counter. Unknown swarms yield zeros.
    async fn stats(&self, info_hash: InfoHash) -> Result<SwarmStats, StoreError>;

    /// Bump the swarm's completed counter and return the new value.
    async fn record_completed(&self, info_hash: InfoHash) -> Result<u64, StoreError>;

    /// Seed a completed counter, used when replaying the WAL.
    async fn restore_completed(&self, info_hash: InfoHash, count: u64) -> Result<(), StoreError>;

    /// Total number of peers across all swarms.
    fn total_peers(&self) -> usize;

    /// Number of swarms with at least one peer.
    fn active_swarms(&self) -> usize;
}

/// In-memory swarm registry.
///
/// Peers live in a two-level `DashMap`: the outer map is sharded by info-hash and
/// each swarm holds its own sharded peer map, so writers only contend within a shard.
/// Completed counters are kept apart from the peer maps so that eviction and
/// `stopped` events never lower them.
pub struct MemorySwarmStore {
    swarms: DashMap<InfoHash, DashMap<PeerId, Peer>>,
    completed: DashMap<InfoHash, u64>,
}

impl MemorySwarmStore {
    pub fn new() -> Self {
        Self {
            swarms: DashMap::new(),
            completed: DashMap::new(),
        }
    }

    fn upsert_sync(&self, peer: Peer) -> Option<Peer> {
        let info_hash = peer.info_hash;
        let peer_id = peer.peer_id;

        // Fast path takes only a read lock on the outer shard
        if let Some(swarm) = self.swarms.get(&info_hash) {
            return swarm.insert(peer_id, peer);
        }

        self.swarms
            .entry(info_hash)
            .or_default()
            .insert(peer_id, peer)
    }

    fn delete_sync(&self, info_hash: InfoHash, peer_id: PeerId) -> bool {
        let removed = match self.swarms.get(&info_hash) {
            Some(swarm) => swarm.remove(&peer_id).is_some(),
            None => return false,
        };

        if removed {
            self.swarms.remove_if(&info_hash, |_, swarm| swarm.is_empty());
        }

        removed
    }

    fn list_peers_sync(&self, info_hash: InfoHash) -> Vec<Peer> {
        match self.swarms.get(&info_hash) {
            Some(swarm) => swarm.iter().map(|entry| entry.value().clone()).collect(),
            None => Vec::new(),
        }
    }

    fn delete_older_than_sync(&self, cutoff: i64) -> usize {
        let mut removed = 0;

        for swarm in self.swarms.iter() {
            let before = swarm.len();
            swarm.retain(|_, peer| peer.last_announce >= cutoff);
            removed += before.saturating_sub(swarm.len());
        }

        self.swarms.retain(|_, swarm| !swarm.is_empty());

        removed
    }

    fn stats_sync(&self, info_hash: InfoHash) -> SwarmStats {
        let completed = self.completed.get(&info_hash).map(|c| *c).unwrap_or(0);

        let (seeders, leechers) = match self.swarms.get(&info_hash) {
            Some(swarm) => swarm.iter().fold((0u32, 0u32), |(s, l), entry| {
                if entry.value().is_seeder() {
                    (s + 1, l)
                } else {
                    (s, l + 1)
                }
            }),
            None => (0, 0),
        };

        SwarmStats {
            seeders,
            leechers,
            completed,
        }
    }

    fn record_completed_sync(&self, info_hash: InfoHash) -> u64 {
        let mut counter = self.completed.entry(info_hash).or_insert(0);
        *counter += 1;
        *counter
    }
}

impl Default for MemorySwarmStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwarmStore for MemorySwarmStore {
    async fn upsert(&self, peer: Peer) -> Result<Option<Peer>, StoreError> {
        Ok(self.upsert_sync(peer))
    }

    async fn delete(&self, info_hash: InfoHash, peer_id: PeerId) -> Result<bool, StoreError> {
        Ok(self.delete_sync(info_hash, peer_id))
    }

    async fn list_peers(&self, info_hash: InfoHash) -> Result<Vec<Peer>, StoreError> {
        Ok(self.list_peers_sync(info_hash))
    }

    async fn delete_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        Ok(self.delete_older_than_sync(cutoff))
    }

    async fn stats(&self, info_hash: InfoHash) -> Result<SwarmStats, StoreError> {
        Ok(self.stats_sync(info_hash))
    }

    async fn record_completed(&self, info_hash: InfoHash) -> Result<u64, StoreError> {
        Ok(self.record_completed_sync(info_hash))
    }

    async fn restore_completed(&self, info_hash: InfoHash, count: u64) -> Result<(), StoreError> {
        self.completed.insert(info_hash, count);
        Ok(())
    }

    fn total_peers(&self) -> usize {
        self.swarms.iter().map(|entry| entry.value().len()).sum()
    }

    fn active_swarms(&self) -> usize {
        self.swarms.len()
    }
}
