//! A manager driver backed by a fixed fleet of pre-provisioned endpoints.
//!
//! "Creating" a container leases the next free endpoint from the configured
//! list; "destroying" one returns its endpoint to the free list. This is the
//! driver the binary ships with: it needs no orchestrator and behaves
//! deterministically, which also makes it the workhorse of the test suite.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pool::Container;

use super::error::ManagerError;
use super::ContainerManager;

/// Configuration for [`StaticBackendManager`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Endpoints available for leasing, e.g. `["127.0.0.1:9000"]`.
    pub backends: Vec<SocketAddr>,
}

/// Free-list state shared under one lock.
struct Fleet {
    free: Vec<SocketAddr>,
    leased: HashMap<String, SocketAddr>,
}

/// Manager driver that leases endpoints from a fixed list.
pub struct StaticBackendManager {
    fleet: Mutex<Fleet>,
    limit: usize,
    next_id: AtomicU64,
}

impl StaticBackendManager {
    /// Create a driver over the given endpoints.
    #[must_use]
    pub fn new(backends: Vec<SocketAddr>) -> Self {
        let limit = backends.len();
        Self {
            fleet: Mutex::new(Fleet {
                free: backends,
                leased: HashMap::new(),
            }),
            limit,
            next_id: AtomicU64::new(1),
        }
    }

    /// Total endpoints this driver was configured with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Endpoints currently free for leasing.
    #[must_use]
    pub fn free_endpoints(&self) -> usize {
        self.fleet.lock().expect("fleet lock poisoned").free.len()
    }
}

impl ContainerManager for StaticBackendManager {
    async fn create_container(&self) -> Result<Container, ManagerError> {
        let mut fleet = self.fleet.lock().expect("fleet lock poisoned");
        let Some(endpoint) = fleet.free.pop() else {
            return Err(ManagerError::Exhausted { limit: self.limit });
        };

        let id = format!("backend-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        fleet.leased.insert(id.clone(), endpoint);
        debug!(container_id = %id, endpoint = %endpoint, "leased backend endpoint");
        Ok(Container::new(id, endpoint.ip(), endpoint.port()))
    }

    async fn destroy_container(&self, external_id: &str) -> Result<(), ManagerError> {
        let mut fleet = self.fleet.lock().expect("fleet lock poisoned");
        if let Some(endpoint) = fleet.leased.remove(external_id) {
            fleet.free.push(endpoint);
            debug!(container_id = %external_id, endpoint = %endpoint, "returned backend endpoint");
        }
        // An unknown identifier means the lease is already gone; teardown
        // is idempotent.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpoints(count: u16) -> Vec<SocketAddr> {
        (0..count)
            .map(|i| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000 + i))
            .collect()
    }

    #[tokio::test]
    async fn test_lease_and_return() {
        let manager = StaticBackendManager::new(endpoints(2));

        let a = manager.create_container().await.unwrap();
        let b = manager.create_container().await.unwrap();
        assert_ne!(a.external_id(), b.external_id());
        assert_ne!(a.socket_addr(), b.socket_addr());
        assert_eq!(manager.free_endpoints(), 0);

        manager.destroy_container(a.external_id()).await.unwrap();
        assert_eq!(manager.free_endpoints(), 1);

        let c = manager.create_container().await.unwrap();
        assert_eq!(c.socket_addr(), a.socket_addr());
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let manager = StaticBackendManager::new(endpoints(1));
        manager.create_container().await.unwrap();

        let err = manager.create_container().await.unwrap_err();
        assert!(matches!(err, ManagerError::Exhausted { limit: 1 }));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let manager = StaticBackendManager::new(endpoints(1));
        let container = manager.create_container().await.unwrap();

        manager.destroy_container(container.external_id()).await.unwrap();
        manager.destroy_container(container.external_id()).await.unwrap();
        assert_eq!(manager.free_endpoints(), 1);
    }
}
