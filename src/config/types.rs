//! Top-level configuration types.

use serde::{Deserialize, Serialize};

use crate::listener::ListenerConfig;
use crate::manager::ManagerConfig;
use crate::monitor::MonitorConfig;
use crate::pool::PoolSettings;
use crate::stats::StatsConfig;

use super::error::{ConfigError, ConfigResult};

/// The whole proxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// TLS listener settings.
    pub listener: ListenerConfig,

    /// Pool sizing.
    pub pool: PoolSettings,

    /// Backend fleet for the static manager driver.
    pub manager: ManagerConfig,

    /// Statistics endpoint.
    pub stats: StatsConfig,

    /// Monitor sink selection.
    pub monitor: MonitorConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        self.pool.validate().map_err(ConfigError::ValidationError)?;

        if self.stats.enabled
            && self.stats.port == self.listener.port
            && self.stats.address == self.listener.address
        {
            return Err(ConfigError::ValidationError(format!(
                "statistics endpoint and listener both bound to {}",
                self.listener.socket_addr()
            )));
        }

        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter, overridable from the command line.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
