//! Listener configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the TLS listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address.
    pub address: IpAddr,

    /// Listen port.
    pub port: u16,

    /// PEM file with the certificate chain. When unset (together with
    /// `key_path`) a self-signed localhost certificate is generated.
    pub cert_path: Option<PathBuf>,

    /// PEM file with the private key.
    pub key_path: Option<PathBuf>,

    /// Disable Nagle's algorithm on accepted sockets.
    pub tcp_nodelay: bool,

    /// TLS handshake timeout in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 28443,
            cert_path: None,
            key_path: None,
            tcp_nodelay: true,
            handshake_timeout_secs: 10,
        }
    }
}

impl ListenerConfig {
    /// The socket address to bind.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// The handshake timeout as a `Duration`.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
