//! The container pool: allocation, release, and opportunistic scaling.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::manager::ContainerManager;
use crate::monitor::Monitor;

use super::config::PoolSettings;
use super::container::Container;
use super::error::{PoolError, PoolResult};
use super::scaling::{containers_to_add, containers_to_remove};

/// Upper bound on concurrent container creations during a single
/// provisioning pass. Manager calls can take seconds each; this keeps a
/// large scale-up from flooding the manager API.
const PROVISION_CONCURRENCY: usize = 4;

/// A `used` entry: the container plus the client bound to it.
struct UsedEntry {
    container: Arc<Container>,
    client: SocketAddr,
}

/// Mutable pool state. Guarded by a single mutex; hold times are bounded to
/// map operations, never manager calls or network I/O.
struct PoolState {
    /// Master map of every container the pool owns.
    containers: HashMap<String, Arc<Container>>,

    /// Containers with no client bound.
    unused: HashMap<String, Arc<Container>>,

    /// Containers currently serving a client.
    used: HashMap<String, UsedEntry>,

    /// Single-slot admission gate: true while one scaling pass is in
    /// flight. Concurrent callers skip scaling rather than queue.
    is_scaling: bool,
}

impl PoolState {
    fn new() -> Self {
        Self {
            containers: HashMap::new(),
            unused: HashMap::new(),
            used: HashMap::new(),
            is_scaling: false,
        }
    }

    /// Take an arbitrary container out of the unused map. Selection order
    /// is whatever the map yields; no fairness is promised.
    fn take_any_unused(&mut self) -> Option<Arc<Container>> {
        let id = self.unused.keys().next().cloned()?;
        self.unused.remove(&id)
    }
}

/// Point-in-time view of one pooled container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSnapshot {
    /// Manager-assigned identifier.
    pub external_id: String,
    /// Backend IP address.
    pub ip: std::net::IpAddr,
    /// Backend port.
    pub port: u16,
    /// Whether a client is currently bound.
    pub in_use: bool,
    /// The bound client, when in use.
    pub client: Option<SocketAddr>,
}

/// Consistent point-in-time view of the pool, taken under the pool lock.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    /// Configured ceiling.
    pub maximum_size: usize,
    /// Containers currently serving a client.
    pub used: usize,
    /// Idle containers.
    pub unused: usize,
    /// Whether a scaling pass is in flight.
    pub is_scaling: bool,
    /// Every container, ordered by identifier.
    pub containers: Vec<ContainerSnapshot>,
}

/// The container pool.
///
/// Owns the set of backend containers and atomically assigns one idle
/// container per client connection. Scaling is opportunistic: `associate`
/// may grow the pool, `dissociate` may shrink it, and at most one scaling
/// pass runs at a time.
pub struct ContainerPool<M> {
    state: Mutex<PoolState>,
    settings: PoolSettings,
    manager: Arc<M>,
    monitor: Arc<dyn Monitor>,
    provision_gate: Arc<Semaphore>,
}

impl<M: ContainerManager> ContainerPool<M> {
    /// Create a pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] when the settings violate
    /// a cross-field constraint.
    pub fn new(
        manager: Arc<M>,
        settings: PoolSettings,
        monitor: Arc<dyn Monitor>,
    ) -> PoolResult<Self> {
        settings
            .validate()
            .map_err(|reason| PoolError::InvalidConfiguration { reason })?;

        Ok(Self {
            state: Mutex::new(PoolState::new()),
            settings,
            manager,
            monitor,
            provision_gate: Arc::new(Semaphore::new(PROVISION_CONCURRENCY)),
        })
    }

    /// The pool's sizing settings.
    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("pool state lock poisoned")
    }

    /// Provision the initial containers.
    ///
    /// Returns the per-container failures; partial success is fine and the
    /// pool keeps operating with whatever was provisioned.
    pub async fn initialise(&self) -> Vec<PoolError> {
        let errors = self.add_containers(self.settings.initial_size).await;
        let snapshot = self.snapshot();
        info!(
            containers = snapshot.used + snapshot.unused,
            requested = self.settings.initial_size,
            "pool initialised"
        );
        errors
    }

    /// Atomically bind an idle container to `client` and return it.
    ///
    /// Triggers an opportunistic scale-up after the binding. The caller owns
    /// closing the client socket on failure.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolFull`] when no idle container exists at the
    /// moment of the decision.
    pub async fn associate(&self, client: SocketAddr) -> PoolResult<Arc<Container>> {
        let picked = {
            let mut state = self.state();
            match state.take_any_unused() {
                Some(container) => {
                    state.used.insert(
                        container.external_id().to_string(),
                        UsedEntry {
                            container: Arc::clone(&container),
                            client,
                        },
                    );
                    Some((container, state.used.len(), state.containers.len()))
                }
                None => None,
            }
        };

        match picked {
            Some((container, used, total)) => {
                self.monitor.pool_stats(client, used, total);
                self.monitor.connection_accepted(client);
                debug!(
                    container_id = container.external_id(),
                    client = %client,
                    "container associated"
                );

                for error in self.scale_up_if_required().await {
                    warn!(%error, "scale-up failure");
                }
                Ok(container)
            }
            None => {
                self.monitor.connection_rejected(client);
                Err(PoolError::PoolFull)
            }
        }
    }

    /// Release a container back to the unused set.
    ///
    /// Triggers an opportunistic scale-down after the pool lock is released.
    /// A container that is no longer tracked (scale-down race, repeated
    /// release) is logged and not resurrected.
    pub async fn dissociate(&self, client: SocketAddr, container: &Container) {
        let stats = {
            let mut state = self.state();
            match state.used.remove(container.external_id()) {
                Some(entry) => {
                    if state.containers.contains_key(container.external_id()) {
                        state
                            .unused
                            .insert(container.external_id().to_string(), entry.container);
                    } else {
                        warn!(
                            container_id = container.external_id(),
                            "released container is no longer tracked by the pool"
                        );
                    }
                    Some((state.used.len(), state.containers.len()))
                }
                None => {
                    warn!(
                        container_id = container.external_id(),
                        "release for a container that is not marked used"
                    );
                    None
                }
            }
        };

        if let Some((used, total)) = stats {
            self.monitor.pool_stats(client, used, total);
            debug!(
                container_id = container.external_id(),
                client = %client,
                "container released"
            );
        }

        for error in self.scale_down_if_required().await {
            warn!(%error, "scale-down failure");
        }
    }

    /// Dial the container's backend endpoint. Does not touch the pool lock;
    /// the returned stream is owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::BackendDialFailed`] when the dial fails.
    pub async fn connect_to_backend(&self, container: &Container) -> PoolResult<TcpStream> {
        let address = container.socket_addr();
        TcpStream::connect(address)
            .await
            .map_err(|source| PoolError::BackendDialFailed { address, source })
    }

    /// Take a consistent snapshot of the pool under the lock.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state();
        let mut containers: Vec<ContainerSnapshot> = state
            .containers
            .values()
            .map(|container| {
                let client = state
                    .used
                    .get(container.external_id())
                    .map(|entry| entry.client);
                ContainerSnapshot {
                    external_id: container.external_id().to_string(),
                    ip: container.ip(),
                    port: container.port(),
                    in_use: client.is_some(),
                    client,
                }
            })
            .collect();
        containers.sort_by(|a, b| a.external_id.cmp(&b.external_id));

        PoolSnapshot {
            maximum_size: self.settings.maximum_size,
            used: state.used.len(),
            unused: state.unused.len(),
            is_scaling: state.is_scaling,
            containers,
        }
    }

    /// Grow the pool when the free headroom is below target and no other
    /// scaling pass is in flight.
    async fn scale_up_if_required(&self) -> Vec<PoolError> {
        let amount = {
            let mut state = self.state();
            if state.is_scaling {
                return Vec::new();
            }
            state.is_scaling = true;
            containers_to_add(
                state.containers.len(),
                self.settings.maximum_size,
                state.unused.len(),
                self.settings.target_free_size,
            )
        };

        let errors = if amount > 0 {
            debug!(amount, "scaling pool up");
            self.add_containers(amount).await
        } else {
            Vec::new()
        };

        self.state().is_scaling = false;
        errors
    }

    /// Shrink the pool when idle containers exceed the target and no other
    /// scaling pass is in flight.
    async fn scale_down_if_required(&self) -> Vec<PoolError> {
        let amount = {
            let mut state = self.state();
            if state.is_scaling {
                return Vec::new();
            }
            state.is_scaling = true;
            containers_to_remove(state.unused.len(), self.settings.target_free_size)
        };

        let errors = if amount > 0 {
            debug!(amount, "scaling pool down");
            self.remove_containers(amount).await
        } else {
            Vec::new()
        };

        self.state().is_scaling = false;
        errors
    }

    /// Create `count` containers in parallel (bounded fan-out) and admit
    /// each one under the lock. A container created past the ceiling is
    /// destroyed immediately rather than retained.
    async fn add_containers(&self, count: usize) -> Vec<PoolError> {
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            let manager = Arc::clone(&self.manager);
            let gate = Arc::clone(&self.provision_gate);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire_owned().await;
                manager.create_container().await
            }));
        }

        let mut errors = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(container)) => {
                    if let Some(surplus) = self.admit(container) {
                        // Lost the race to the ceiling; tear it down again.
                        info!(
                            container_id = surplus.external_id(),
                            "pool reached maximum size; destroying surplus container"
                        );
                        if let Err(error) =
                            self.manager.destroy_container(surplus.external_id()).await
                        {
                            errors.push(PoolError::DestroyFailed(error));
                        }
                    }
                }
                Ok(Err(error)) => errors.push(PoolError::CreateFailed(error)),
                Err(join_error) => errors.push(PoolError::CreateFailed(
                    crate::manager::ManagerError::CreateFailed(format!(
                        "provisioning task failed: {join_error}"
                    )),
                )),
            }
        }
        errors
    }

    /// Insert a freshly created container, re-checking the ceiling under the
    /// lock. Returns the container back when the pool is already full.
    fn admit(&self, container: Container) -> Option<Container> {
        let mut state = self.state();
        if state.containers.len() >= self.settings.maximum_size {
            return Some(container);
        }
        let container = Arc::new(container);
        info!(container_id = container.external_id(), "container created");
        state
            .unused
            .insert(container.external_id().to_string(), Arc::clone(&container));
        state
            .containers
            .insert(container.external_id().to_string(), container);
        None
    }

    /// Remove up to `count` idle containers under the lock, then destroy
    /// them outside of it.
    async fn remove_containers(&self, count: usize) -> Vec<PoolError> {
        let victims: Vec<Arc<Container>> = {
            let mut state = self.state();
            let ids: Vec<String> = state.unused.keys().take(count).cloned().collect();
            ids.into_iter()
                .filter_map(|id| {
                    let container = state.unused.remove(&id);
                    state.containers.remove(&id);
                    // shouldn't be possible, but keep the maps consistent
                    state.used.remove(&id);
                    container
                })
                .collect()
        };

        let mut errors = Vec::new();
        for container in victims {
            match self.manager.destroy_container(container.external_id()).await {
                Ok(()) => info!(container_id = container.external_id(), "container destroyed"),
                Err(error) => errors.push(PoolError::DestroyFailed(error)),
            }
        }
        errors
    }

    /// Destroy every container the pool owns. Used on teardown.
    pub async fn shutdown(&self) -> Vec<PoolError> {
        let victims: Vec<Arc<Container>> = {
            let mut state = self.state();
            state.unused.clear();
            state.used.clear();
            state.containers.drain().map(|(_, c)| c).collect()
        };

        let mut errors = Vec::new();
        for container in victims {
            if let Err(error) = self.manager.destroy_container(container.external_id()).await {
                errors.push(PoolError::DestroyFailed(error));
            }
        }
        errors
    }
}
