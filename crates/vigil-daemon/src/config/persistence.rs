use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub write_timeout_ms: u64,
    pub max_buffered: usize,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub cache_capacity_mb: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 1_000,
            max_buffered: 10_000,
            retry_base_ms: 500,
            retry_max_ms: 30_000,
            cache_capacity_mb: 64,
        }
    }
}

impl PersistenceConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }
}
