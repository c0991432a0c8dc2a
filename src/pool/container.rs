//! Container identity and endpoint.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// A backend container: a manager-assigned identity plus the TCP endpoint
/// it serves on.
///
/// The pool owns every container it tracks; proxy sessions only borrow one
/// for the duration of a client connection. The sockets themselves are owned
/// by the session, never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Manager-assigned identifier, unique within the pool.
    external_id: String,

    /// Address the container is reachable on.
    ip: IpAddr,

    /// Port the container is reachable on.
    port: u16,
}

impl Container {
    /// Create a new container record.
    #[must_use]
    pub fn new(external_id: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self {
            external_id: external_id.into(),
            ip,
            port,
        }
    }

    /// The manager-assigned identifier.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// The container's IP address.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// The container's port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The full backend endpoint.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}
