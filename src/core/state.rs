// Application state (AppState)

use crate::core::config::Config;
use crate::metrics::collector::Metrics;
use crate::security::access_control::AccessControl;
use crate::security::rate_limiter::{KeyedRateLimiter, TokenBucket};
use crate::stores::access_list::{AccessListStore, MemoryAccessList};
use crate::stores::swarm_store::{MemorySwarmStore, SwarmStore};
use crate::udp::connection::ConnectionTable;
use crate::wal::wal::Wal;
use std::sync::Arc;

/// Shared application state
///
/// One instance is shared by the HTTP handlers, the UDP server and the sweeper.
#[derive(Clone)]
pub struct AppState {
    /// Live peers per swarm
    pub swarm_store: Arc<dyn SwarmStore>,

    /// Allow/deny lists consulted before every request
    pub access: Arc<AccessControl>,

    /// Process-wide admission gate
    pub bucket: Arc<TokenBucket>,

    /// Optional per-IP limiter behind the bucket
    pub keyed_limiter: Option<Arc<KeyedRateLimiter>>,

    /// UDP connection IDs
    pub udp_connections: Arc<ConnectionTable>,

    pub metrics: Arc<Metrics>,

    /// Write-Ahead Log for completed counters and access list changes
    pub wal: Arc<Wal>,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, wal: Wal) -> Self {
        let lists = Arc::new(MemoryAccessList::with_entries(
            &config.access.allowed_ips,
            &config.access.denied_ips,
        ));

        Self::with_stores(config, wal, Arc::new(MemorySwarmStore::new()), lists)
    }

    /// Build state around caller-supplied stores
    pub fn with_stores(
        config: Config,
        wal: Wal,
        swarm_store: Arc<dyn SwarmStore>,
        access_lists: Arc<dyn AccessListStore>,
    ) -> Self {
        let config = Arc::new(config);

        let access = Arc::new(AccessControl::new(
            access_lists,
            config.access.mode,
            config.server.request_timeout(),
        ));

        let bucket = Arc::new(TokenBucket::new(
            config.rate_limit.capacity,
            config.rate_limit.refill_per_second,
        ));

        let keyed_limiter = config
            .rate_limit
            .per_ip_requests_per_minute
            .map(|limit| Arc::new(KeyedRateLimiter::new(limit)));

        Self {
            swarm_store,
            access,
            bucket,
            keyed_limiter,
            udp_connections: Arc::new(ConnectionTable::new(config.udp.connection_ttl_secs)),
            metrics: Arc::new(Metrics::new()),
            wal: Arc::new(wal),
            config,
        }
    }
}
