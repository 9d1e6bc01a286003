use std::fmt;
use std::net::IpAddr;

/// 20-byte swarm identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash(pub [u8; 20]);

/// 20-byte client-chosen peer identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 20]);

impl InfoHash {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(InfoHash)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl PeerId {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(PeerId)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
}

/// One client's participation in one swarm
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub peer_id: PeerId,
    pub info_hash: InfoHash,
    /// Address the peer announced from
    pub ip: IpAddr,
    /// Advertised listening port
    pub port: u16,
    /// Cumulative bytes uploaded, as reported by the client
    pub uploaded: u64,
    /// Cumulative bytes downloaded, as reported by the client
    pub downloaded: u64,
    /// Bytes left to download (0 for seeders)
    pub left: u64,
    /// Unix timestamp of last announce
    pub last_announce: i64,
    /// Upload total recorded after the previous announce
    pub snapshot_uploaded: u64,
    /// Download total recorded after the previous announce
    pub snapshot_downloaded: u64,
}

impl Peer {
    pub fn new(
        peer_id: PeerId,
        info_hash: InfoHash,
        ip: IpAddr,
        port: u16,
        uploaded: u64,
        downloaded: u64,
        left: u64,
        last_announce: i64,
    ) -> Self {
        Self {
            peer_id,
            info_hash,
            ip,
            port,
            uploaded,
            downloaded,
            left,
            last_announce,
            snapshot_uploaded: uploaded,
            snapshot_downloaded: downloaded,
        }
    }

    pub fn is_seeder(&self) -> bool {
        self.left == 0
    }
}

/// Aggregate counts for one swarm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmStats {
    pub seeders: u32,
    pub leechers: u32,
    /// Monotonic count of `completed` events ever seen
    pub completed: u64,
}
