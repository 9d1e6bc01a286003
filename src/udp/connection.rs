use dashmap::DashMap;
use std::net::SocketAddr;

/// Connection IDs handed out by UDP connect, each bound to the address that asked for it
pub struct ConnectionTable {
    issued: DashMap<i64, (SocketAddr, i64)>,
    ttl_secs: i64,
}

impl ConnectionTable {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            issued: DashMap::new(),
            ttl_secs,
        }
    }

    /// Issue a fresh random connection ID for `addr`
    pub fn issue(&self, addr: SocketAddr, now: i64) -> i64 {
        loop {
            let id: i64 = rand::random();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.issued.entry(id) {
                slot.insert((addr, now));
                return id;
            }
        }
    }

    /// An ID is valid for the address it was issued to until the TTL lapses
    pub fn validate(&self, id: i64, addr: SocketAddr, now: i64) -> bool {
        match self.issued.get(&id) {
            Some(entry) => {
                let (owner, issued_at) = *entry.value();
                owner == addr && now - issued_at < self.ttl_secs
            }
            None => false,
        }
    }

    /// Drop expired IDs, returning how many were removed
    pub fn prune(&self, now: i64) -> usize {
        let before = self.issued.len();
        self.issued
            .retain(|_, (_, issued_at)| now - *issued_at < self.ttl_secs);
        before.saturating_sub(self.issued.len())
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}
