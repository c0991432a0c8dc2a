//! Pool sizing settings.

use serde::{Deserialize, Serialize};

/// Sizing settings for the container pool. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Containers provisioned synchronously at startup.
    pub initial_size: usize,

    /// Hard ceiling on the number of containers the pool may own.
    pub maximum_size: usize,

    /// Desired steady-state count of unused containers; the pool scales
    /// toward this value.
    pub target_free_size: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_size: 2,
            maximum_size: 8,
            target_free_size: 2,
        }
    }
}

impl PoolSettings {
    /// Check the cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_size > self.maximum_size {
            return Err(format!(
                "initial_size ({}) exceeds maximum_size ({})",
                self.initial_size, self.maximum_size
            ));
        }
        if self.target_free_size > self.maximum_size {
            return Err(format!(
                "target_free_size ({}) exceeds maximum_size ({})",
                self.target_free_size, self.maximum_size
            ));
        }
        Ok(())
    }
}
