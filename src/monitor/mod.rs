//! # Monitor Sink
//!
//! Best-effort observation of connection and pool events. Every operation
//! must be cheap, non-blocking, and must never panic; the core never fails
//! because of its monitor.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Sink for connection and pool events.
pub trait Monitor: Send + Sync {
    /// A client connection was bound to a container.
    fn connection_accepted(&self, client: SocketAddr);

    /// A client connection was turned away (pool full).
    fn connection_rejected(&self, client: SocketAddr);

    /// Pool occupancy after an associate or dissociate.
    fn pool_stats(&self, client: SocketAddr, used: usize, total: usize);

    /// One proxy direction finished copying `bytes` bytes.
    fn bytes_copied(&self, src_is_backend: bool, bytes: u64, dst: SocketAddr, src: SocketAddr);

    /// The sink is being shut down.
    fn close(&self);
}

/// A monitor that discards every event.
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn connection_accepted(&self, _client: SocketAddr) {}
    fn connection_rejected(&self, _client: SocketAddr) {}
    fn pool_stats(&self, _client: SocketAddr, _used: usize, _total: usize) {}
    fn bytes_copied(&self, _src_is_backend: bool, _bytes: u64, _dst: SocketAddr, _src: SocketAddr) {
    }
    fn close(&self) {}
}

/// A monitor that emits every event as a structured log record.
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn connection_accepted(&self, client: SocketAddr) {
        info!(client = %client, "connection accepted");
    }

    fn connection_rejected(&self, client: SocketAddr) {
        info!(client = %client, "connection rejected");
    }

    fn pool_stats(&self, client: SocketAddr, used: usize, total: usize) {
        debug!(client = %client, used, total, "pool occupancy");
    }

    fn bytes_copied(&self, src_is_backend: bool, bytes: u64, dst: SocketAddr, src: SocketAddr) {
        debug!(src_is_backend, bytes, dst = %dst, src = %src, "copy finished");
    }

    fn close(&self) {
        debug!("monitor closed");
    }
}

/// Which monitor implementation the binary runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    /// Emit events through `tracing`.
    #[default]
    Log,
    /// Discard events.
    Off,
}

/// Configuration for the monitor sink.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Selected implementation.
    pub mode: MonitorMode,
}

/// Build the monitor selected by `mode`.
#[must_use]
pub fn from_mode(mode: MonitorMode) -> Arc<dyn Monitor> {
    match mode {
        MonitorMode::Log => Arc::new(LogMonitor),
        MonitorMode::Off => Arc::new(NoopMonitor),
    }
}
