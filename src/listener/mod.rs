//! # TLS Listener
//!
//! Accepts client connections, terminates TLS, and drives each connection
//! through the pool: associate, dial the backend, run the proxy session,
//! dissociate.

mod accept;
mod certificate;
mod config;
mod error;

pub use accept::ProxyListener;
pub use certificate::load_server_config;
pub use config::ListenerConfig;
pub use error::{ListenerError, ListenerResult};
