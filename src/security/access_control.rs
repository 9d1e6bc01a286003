use crate::core::config::AccessMode;
use crate::core::error::StoreError;
use crate::stores::access_list::{AccessListStore, ListKind};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a requesting IP may use the tracker.
///
/// The deny list is consulted first and short-circuits. After that, membership
/// on the allow list admits the IP. An IP on neither list is refused in
/// `Allowlist` mode; in `Open` mode it is admitted only while the allow list is empty.
pub struct AccessControl {
    lists: Arc<dyn AccessListStore>,
    mode: AccessMode,
    timeout: Duration,
}

impl AccessControl {
    pub fn new(lists: Arc<dyn AccessListStore>, mode: AccessMode, timeout: Duration) -> Self {
        Self {
            lists,
            mode,
            timeout,
        }
    }

    pub fn lists(&self) -> &Arc<dyn AccessListStore> {
        &self.lists
    }

    /// Lookup failures surface as `Err`, never as a denial
    pub async fn is_allowed(&self, ip: IpAddr) -> Result<bool, StoreError> {
        if self.lookup(self.lists.contains(ListKind::Deny, ip)).await? {
            return Ok(false);
        }

        if self.lookup(self.lists.contains(ListKind::Allow, ip)).await? {
            return Ok(true);
        }

        match self.mode {
            AccessMode::Allowlist => Ok(false),
            AccessMode::Open => self.lookup(self.lists.is_empty(ListKind::Allow)).await,
        }
    }

    async fn lookup<F>(&self, fut: F) -> Result<bool, StoreError>
    where
        F: std::future::Future<Output = Result<bool, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "access_lookup",
                after: self.timeout,
            })?
    }
}
