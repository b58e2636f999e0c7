//! Lifecycle configuration.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Quiet period a debounced subscriber waits for before refreshing
    /// (default: 1000 ms).
    pub debounce_ms: u64,
    /// Interval between warranty-expiry sweeps (default: 3600 s).
    pub expiry_sweep_secs: u64,
    /// Events buffered per change-feed receiver before it lags.
    pub feed_capacity: usize,
}

impl LifecycleConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            expiry_sweep_secs: 3600,
            feed_capacity: 256,
        }
    }
}
