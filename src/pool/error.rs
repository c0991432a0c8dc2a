//! Container pool error types.

use std::net::SocketAddr;

use thiserror::Error;

use crate::manager::ManagerError;

/// Errors that can occur in the container pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool settings violate a cross-field constraint.
    #[error("invalid pool configuration: {reason}")]
    InvalidConfiguration {
        /// The violated constraint.
        reason: String,
    },

    /// No idle container was available for an inbound connection. This is
    /// an expected outcome under load, not an internal failure; the caller
    /// rejects the client connection.
    #[error("pool is full; no idle container available")]
    PoolFull,

    /// The container manager failed to provision a backend.
    #[error("container creation failed: {0}")]
    CreateFailed(#[source] ManagerError),

    /// The container manager failed to tear a backend down.
    #[error("container destruction failed: {0}")]
    DestroyFailed(#[source] ManagerError),

    /// Dialing a container's backend endpoint failed.
    #[error("failed to dial backend {address}: {source}")]
    BackendDialFailed {
        /// The backend endpoint.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
