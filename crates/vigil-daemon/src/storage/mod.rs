mod config;
mod metrics;
mod persistence;
mod records;
mod types;

#[cfg(test)]
mod tests;

pub use config::StorageConfig;
pub use metrics::{StorageMetrics, StorageMetricsSnapshot};
pub use types::{SchemaInfo, TreeSizes};

use sled::{Db, Tree};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use vigil_types::{VigilError, VigilResult};

const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_KEY: &[u8] = b"__schema_version__";

/// Durable store for the attempt log, the in-flight set and the supervision
/// journal. Cheap to clone; clones share the same database.
#[derive(Clone)]
pub struct SupervisorStorage {
    db: Db,
    schema: Tree,
    attempts: Tree,
    inflight: Tree,
    events: Tree,
    storage_config: Arc<StorageConfig>,
    metrics: Arc<StorageMetrics>,
}

impl SupervisorStorage {
    pub fn open(config: StorageConfig) -> VigilResult<Self> {
        info!("Opening storage at {:?}", config.path);

        let sled_config = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity_bytes)
            .flush_every_ms(config.flush_every_ms);

        let db = sled_config
            .open()
            .map_err(|e| VigilError::Storage(format!("Failed to open database: {}", e)))?;

        let storage = Self::create_from_db(db, config)?;
        storage.ensure_schema()?;

        info!("Storage opened (schema version {})", CURRENT_SCHEMA_VERSION);
        Ok(storage)
    }

    pub fn in_memory() -> VigilResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| VigilError::Storage(format!("Failed to open temp database: {}", e)))?;

        let config = StorageConfig {
            path: std::path::PathBuf::new(),
            ..Default::default()
        };

        let storage = Self::create_from_db(db, config)?;
        storage.ensure_schema()?;
        Ok(storage)
    }

    fn create_from_db(db: Db, config: StorageConfig) -> VigilResult<Self> {
        Ok(Self {
            schema: Self::open_tree(&db, "schema")?,
            attempts: Self::open_tree(&db, "attempts")?,
            inflight: Self::open_tree(&db, "inflight")?,
            events: Self::open_tree(&db, "events")?,
            db,
            storage_config: Arc::new(config),
            metrics: Arc::new(StorageMetrics::new()),
        })
    }

    fn open_tree(db: &Db, name: &str) -> VigilResult<Tree> {
        db.open_tree(name)
            .map_err(|e| VigilError::Storage(format!("Failed to open {} tree: {}", name, e)))
    }

    fn ensure_schema(&self) -> VigilResult<()> {
        match self.get_schema_info()? {
            None => self.initialize_schema(),
            Some(info) if info.version > CURRENT_SCHEMA_VERSION => Err(VigilError::Storage(format!(
                "Database schema version {} is newer than supported {}",
                info.version, CURRENT_SCHEMA_VERSION
            ))),
            Some(_) => Ok(()),
        }
    }

    fn initialize_schema(&self) -> VigilResult<()> {
        info!("Initializing new database with schema version {}", CURRENT_SCHEMA_VERSION);
        self.write_schema(&SchemaInfo {
            version: CURRENT_SCHEMA_VERSION,
            created_at: chrono::Utc::now().timestamp(),
        })?;
        self.flush()
    }

    fn write_schema(&self, info: &SchemaInfo) -> VigilResult<()> {
        let bytes = bincode::serialize(info)
            .map_err(|e| VigilError::Storage(format!("Failed to serialize schema: {}", e)))?;
        self.schema
            .insert(SCHEMA_KEY, bytes)
            .map_err(|e| VigilError::Storage(format!("Failed to store schema: {}", e)))?;
        Ok(())
    }

    fn get_schema_info(&self) -> VigilResult<Option<SchemaInfo>> {
        match self
            .schema
            .get(SCHEMA_KEY)
            .map_err(|e| VigilError::Storage(format!("Failed to read schema: {}", e)))?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| {
                VigilError::Storage(format!("Failed to deserialize schema: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    pub fn schema_version(&self) -> VigilResult<u32> {
        self.get_schema_info().map(|info| info.map(|i| i.version).unwrap_or(0))
    }

    pub fn flush(&self) -> VigilResult<()> {
        self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
        self.db
            .flush()
            .map_err(|e| VigilError::Storage(format!("Flush error: {}", e)))?;
        Ok(())
    }

    pub async fn flush_async(&self) -> VigilResult<()> {
        self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
        self.db
            .flush_async()
            .await
            .map_err(|e| VigilError::Storage(format!("Flush error: {}", e)))?;
        Ok(())
    }

    pub fn size_on_disk(&self) -> VigilResult<u64> {
        self.db
            .size_on_disk()
            .map_err(|e| VigilError::Storage(format!("Size error: {}", e)))
    }

    pub fn tree_sizes(&self) -> TreeSizes {
        TreeSizes {
            attempts: self.attempts.len(),
            inflight: self.inflight.len(),
            events: self.events.len(),
        }
    }

    pub fn storage_metrics(&self) -> Arc<StorageMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_in_memory(&self) -> bool {
        self.storage_config.path.as_os_str().is_empty()
    }
}
