//! Statistics endpoint error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur in the statistics server.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Failed to bind to the configured address.
    #[error("failed to bind statistics endpoint to {address}: {source}")]
    BindError {
        /// The address that failed to bind.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for statistics operations.
pub type StatsResult<T> = Result<T, StatsError>;
