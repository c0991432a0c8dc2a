//! Listener error types.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the TLS listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to the configured address.
    #[error("failed to bind to {address}: {source}")]
    BindError {
        /// The address that failed to bind.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting connections failed fatally.
    #[error("failed to accept connection: {0}")]
    AcceptError(#[source] std::io::Error),

    /// A certificate file could not be loaded.
    #[error("failed to load certificate from '{path}': {message}")]
    CertificateLoadError {
        /// Path to the PEM file.
        path: PathBuf,
        /// Failure detail.
        message: String,
    },

    /// A private key file could not be loaded.
    #[error("failed to load private key from '{path}': {message}")]
    KeyLoadError {
        /// Path to the PEM file.
        path: PathBuf,
        /// Failure detail.
        message: String,
    },

    /// Building the TLS server configuration failed.
    #[error("TLS setup failed: {0}")]
    TlsSetup(String),
}

/// Result type for listener operations.
pub type ListenerResult<T> = Result<T, ListenerError>;
