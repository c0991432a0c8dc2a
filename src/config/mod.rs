//! # Configuration
//!
//! TOML-based configuration for the proxy: listener, pool sizing, backend
//! fleet, statistics endpoint, monitor, and logging. A missing file yields
//! the defaults; a present file must parse and validate.
//!
//! ## Example
//!
//! ```toml
//! [listener]
//! address = "0.0.0.0"
//! port = 28443
//! cert_path = "certs/server.pem"
//! key_path = "certs/server.key"
//!
//! [pool]
//! initial_size = 2
//! maximum_size = 8
//! target_free_size = 2
//!
//! [manager]
//! backends = ["10.0.0.5:9000", "10.0.0.6:9000"]
//!
//! [stats]
//! enabled = true
//! port = 8080
//! ```

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{LoggingConfig, ProxyConfig};
