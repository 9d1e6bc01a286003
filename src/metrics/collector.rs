use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::stores::swarm_store::SwarmStore;
use crate::utils::time::current_timestamp;

#[derive(Debug)]
pub struct Metrics {
    pub total_announces: AtomicU64,
    pub successful_announces: AtomicU64,
    pub failed_announces: AtomicU64,
    pub total_scrapes: AtomicU64,
    pub blocked_requests: AtomicU64,
    pub rate_limited_requests: AtomicU64,
    pub udp_packets: AtomicU64,
    pub uploaded_bytes: AtomicU64,
    pub downloaded_bytes: AtomicU64,
    pub evicted_peers: AtomicU64,
    pub start_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_announces: u64,
    pub successful_announces: u64,
    pub failed_announces: u64,
    pub success_rate: f64,
    pub total_scrapes: u64,
    pub blocked_requests: u64,
    pub rate_limited_requests: u64,
    pub udp_packets: u64,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub evicted_peers: u64,
    pub active_peers: usize,
    pub active_swarms: usize,
    pub uptime_seconds: i64,
    pub requests_per_second: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_announces: AtomicU64::new(0),
            successful_announces: AtomicU64::new(0),
            failed_announces: AtomicU64::new(0),
            total_scrapes: AtomicU64::new(0),
            blocked_requests: AtomicU64::new(0),
            rate_limited_requests: AtomicU64::new(0),
            udp_packets: AtomicU64::new(0),
            uploaded_bytes: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
            evicted_peers: AtomicU64::new(0),
            start_time: current_timestamp(),
        }
    }

    pub fn increment_announces(&self) {
        self.total_announces.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_successful(&self) {
        self.successful_announces.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed_announces.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_scrapes(&self) {
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_blocked(&self) {
        self.blocked_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limited(&self) {
        self.rate_limited_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_udp_packets(&self) {
        self.udp_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Add one announce's traffic delta to the running totals
    pub fn record_traffic(&self, uploaded: u64, downloaded: u64) {
        self.uploaded_bytes.fetch_add(uploaded, Ordering::Relaxed);
        self.downloaded_bytes.fetch_add(downloaded, Ordering::Relaxed);
    }

    pub fn record_evicted(&self, count: usize) {
        self.evicted_peers.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Reads every counter and derives success_rate, requests_per_second and
    /// uptime_seconds. Swarm sizes come from the live store.
    pub fn get_snapshot(&self, swarms: &dyn SwarmStore) -> MetricsSnapshot {
        let total_announces = self.total_announces.load(Ordering::Relaxed);
        let successful_announces = self.successful_announces.load(Ordering::Relaxed);
        let total_scrapes = self.total_scrapes.load(Ordering::Relaxed);

        let success_rate = if total_announces > 0 {
            (successful_announces as f64 / total_announces as f64) * 100.0
        } else {
            0.0
        };

        let uptime_seconds = current_timestamp() - self.start_time;

        let requests_per_second = if uptime_seconds > 0 {
            (total_announces + total_scrapes) as f64 / uptime_seconds as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            total_announces,
            successful_announces,
            failed_announces: self.failed_announces.load(Ordering::Relaxed),
            success_rate,
            total_scrapes,
            blocked_requests: self.blocked_requests.load(Ordering::Relaxed),
            rate_limited_requests: self.rate_limited_requests.load(Ordering::Relaxed),
            udp_packets: self.udp_packets.load(Ordering::Relaxed),
            uploaded_bytes: self.uploaded_bytes.load(Ordering::Relaxed),
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Relaxed),
            evicted_peers: self.evicted_peers.load(Ordering::Relaxed),
            active_peers: swarms.total_peers(),
            active_swarms: swarms.active_swarms(),
            uptime_seconds,
            requests_per_second,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::peer::{InfoHash, Peer, PeerId};
    use crate::stores::swarm_store::MemorySwarmStore;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_new_metrics() {
        let metrics = Metrics::new();

        assert_eq!(metrics.total_announces.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.blocked_requests.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.uploaded_bytes.load(Ordering::Relaxed), 0);
        assert!(metrics.start_time > 0);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();

        metrics.increment_announces();
        metrics.increment_announces();
        metrics.increment_failed();
        metrics.increment_scrapes();
        metrics.increment_blocked();
        metrics.increment_rate_limited();
        metrics.increment_udp_packets();
        metrics.record_evicted(3);

        assert_eq!(metrics.total_announces.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.failed_announces.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_scrapes.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.blocked_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.rate_limited_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.udp_packets.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.evicted_peers.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_record_traffic_accumulates() {
        let metrics = Metrics::new();

        metrics.record_traffic(100, 50);
        metrics.record_traffic(400, 0);

        assert_eq!(metrics.uploaded_bytes.load(Ordering::Relaxed), 500);
        assert_eq!(metrics.downloaded_bytes.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn test_get_snapshot_empty() {
        let metrics = Metrics::new();
        let snapshot = metrics.get_snapshot(&MemorySwarmStore::new());

        assert_eq!(snapshot.total_announces, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.active_peers, 0);
        assert_eq!(snapshot.active_swarms, 0);
        assert!(snapshot.uptime_seconds >= 0);
        assert_eq!(snapshot.requests_per_second, 0.0);
    }

    #[tokio::test]
    async fn test_get_snapshot_with_data() {
        let metrics = Metrics::new();
        let swarms = MemorySwarmStore::new();

        for _ in 0..10 {
            metrics.increment_announces();
        }
        for _ in 0..8 {
            metrics.increment_successful();
        }

        swarms
            .upsert(Peer::new(
                PeerId([1u8; 20]),
                InfoHash([1u8; 20]),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
                6881,
                0,
                0,
                0,
                1000,
            ))
            .await
            .unwrap();

        let snapshot = metrics.get_snapshot(&swarms);

        assert_eq!(snapshot.success_rate, 80.0);
        assert_eq!(snapshot.active_peers, 1);
        assert_eq!(snapshot.active_swarms, 1);
        assert!(snapshot.requests_per_second >= 0.0);
    }
}
