use std::path::{Path, PathBuf};

use crate::config::PersistenceConfig;

const FLUSH_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub cache_capacity_bytes: u64,
    pub flush_every_ms: Option<u64>,
}

impl StorageConfig {
    pub fn from_persistence(path: &Path, persistence: &PersistenceConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            cache_capacity_bytes: persistence.cache_capacity_mb * 1024 * 1024,
            ..Default::default()
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            cache_capacity_bytes: 64 * 1024 * 1024,
            flush_every_ms: Some(FLUSH_INTERVAL_MS),
        }
    }
}
