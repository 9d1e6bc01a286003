use crate::core::error::StoreError;
use async_trait::async_trait;
use dashmap::DashSet;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Allow,
    Deny,
}

/// Source of the allow/deny lists consulted by access control.
///
/// The tracker only reads through this trait on the request path; writes come
/// from the admin surface and WAL replay.
#[async_trait]
pub trait AccessListStore: Send + Sync {
    async fn contains(&self, kind: ListKind, ip: IpAddr) -> Result<bool, StoreError>;

    async fn is_empty(&self, kind: ListKind) -> Result<bool, StoreError>;

    async fn insert(&self, kind: ListKind, ip: IpAddr) -> Result<(), StoreError>;

    /// Remove the IP from both lists
    async fn remove(&self, ip: IpAddr) -> Result<(), StoreError>;

    async fn list(&self, kind: ListKind) -> Result<Vec<IpAddr>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryAccessList {
    allowed: DashSet<IpAddr>,
    denied: DashSet<IpAddr>,
}

impl MemoryAccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the lists from config strings, skipping (and logging) unparsable entries
    pub fn with_entries(allowed: &[String], denied: &[String]) -> Self {
        let list = Self::new();

        for (kind, entries) in [(ListKind::Allow, allowed), (ListKind::Deny, denied)] {
            for ip_str in entries {
                match ip_str.parse::<IpAddr>() {
                    Ok(ip) => {
                        list.set(kind).insert(ip);
                    }
                    Err(e) => {
                        tracing::warn!(ip = %ip_str, error = %e, "Failed to parse IP address in config");
                    }
                }
            }
        }

        tracing::info!(
            allowed = list.allowed.len(),
            denied = list.denied.len(),
            "Initialized access lists"
        );
        list
    }

    /// Place the IP on exactly one list
    pub fn assign(&self, kind: ListKind, ip: IpAddr) {
        match kind {
            ListKind::Allow => {
                self.denied.remove(&ip);
                self.allowed.insert(ip);
            }
            ListKind::Deny => {
                self.allowed.remove(&ip);
                self.denied.insert(ip);
            }
        }
    }

    pub fn clear(&self, ip: IpAddr) {
        self.allowed.remove(&ip);
        self.denied.remove(&ip);
    }

    fn set(&self, kind: ListKind) -> &DashSet<IpAddr> {
        match kind {
            ListKind::Allow => &self.allowed,
            ListKind::Deny => &self.denied,
        }
    }
}

#[async_trait]
impl AccessListStore for MemoryAccessList {
    async fn contains(&self, kind: ListKind, ip: IpAddr) -> Result<bool, StoreError> {
        Ok(self.set(kind).contains(&ip))
    }

    async fn is_empty(&self, kind: ListKind) -> Result<bool, StoreError> {
        Ok(self.set(kind).is_empty())
    }

    async fn insert(&self, kind: ListKind, ip: IpAddr) -> Result<(), StoreError> {
        self.assign(kind, ip);
        Ok(())
    }

    async fn remove(&self, ip: IpAddr) -> Result<(), StoreError> {
        self.clear(ip);
        Ok(())
    }

    async fn list(&self, kind: ListKind) -> Result<Vec<IpAddr>, StoreError> {
        Ok(self.set(kind).iter().map(|entry| *entry.key()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_moves_between_lists() {
        let list = MemoryAccessList::new();
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        list.insert(ListKind::Allow, ip).await.unwrap();
        assert!(list.contains(ListKind::Allow, ip).await.unwrap());

        list.insert(ListKind::Deny, ip).await.unwrap();
        assert!(list.contains(ListKind::Deny, ip).await.unwrap());
        assert!(!list.contains(ListKind::Allow, ip).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_clears_both_lists() {
        let list = MemoryAccessList::new();
        let ip: IpAddr = "2001:db8::1".parse().unwrap();

        list.insert(ListKind::Deny, ip).await.unwrap();
        list.remove(ip).await.unwrap();

        assert!(list.is_empty(ListKind::Deny).await.unwrap());
        assert!(list.is_empty(ListKind::Allow).await.unwrap());

        // Removing an unknown IP is a no-op
        list.remove(ip).await.unwrap();
    }

    #[tokio::test]
    async fn test_with_entries_skips_invalid() {
        let allowed = vec!["10.0.0.1".to_string(), "invalid-ip".to_string()];
        let denied = vec!["192.168.1.100".to_string(), "2001:db8::bad:cafe".to_string()];

        let list = MemoryAccessList::with_entries(&allowed, &denied);

        assert_eq!(list.list(ListKind::Allow).await.unwrap().len(), 1);
        assert_eq!(list.list(ListKind::Deny).await.unwrap().len(), 2);
        assert!(list
            .contains(ListKind::Deny, "2001:db8::bad:cafe".parse().unwrap())
            .await
            .unwrap());
    }
}
