//! # Container Manager
//!
//! The capability the pool consumes to provision and tear down backend
//! containers. Drivers are expected to talk to whatever actually runs the
//! backends (an orchestrator API, a process supervisor, a fixed fleet); the
//! pool only sees [`ContainerManager`].

mod error;
mod static_backends;

pub use error::ManagerError;
pub use static_backends::{ManagerConfig, StaticBackendManager};

use std::future::Future;

use crate::pool::Container;

/// Provisioning capability consumed by the container pool.
///
/// `create_container` must return a new, running backend with a populated
/// identity and endpoint. `destroy_container` is idempotent: tearing down an
/// identifier that is already gone succeeds.
pub trait ContainerManager: Send + Sync + 'static {
    /// Provision a new backend container.
    fn create_container(&self) -> impl Future<Output = Result<Container, ManagerError>> + Send;

    /// Tear down a backend container by identifier. Idempotent.
    fn destroy_container(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<(), ManagerError>> + Send;
}
