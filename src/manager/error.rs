//! Container manager error types.

use thiserror::Error;

/// Errors surfaced by a container manager driver.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Provisioning a backend failed.
    #[error("container creation failed: {0}")]
    CreateFailed(String),

    /// Tearing a backend down failed.
    #[error("failed to destroy container '{external_id}': {message}")]
    DestroyFailed {
        /// The identifier that failed to tear down.
        external_id: String,
        /// Driver-specific failure detail.
        message: String,
    },

    /// The driver has no capacity left to provision from.
    #[error("no backend capacity remaining ({limit} endpoints configured)")]
    Exhausted {
        /// Total endpoints the driver was configured with.
        limit: usize,
    },
}
