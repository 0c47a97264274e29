use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use vigil_types::{VigilError, VigilResult, WorkerId, WorkerType};

use super::{HeartbeatSource, QueueInspector};

/// Heartbeat age from the mtime of `<dir>/<worker_id>`; workers touch the
/// file to signal liveness.
pub struct FileHeartbeat {
    dir: PathBuf,
}

impl FileHeartbeat {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl HeartbeatSource for FileHeartbeat {
    async fn heartbeat_age(&self, worker_id: &WorkerId) -> Option<f64> {
        let path = entry_path(&self.dir, worker_id.as_str())?;
        let modified = tokio::fs::metadata(&path).await.ok()?.modified().ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Some(age)
    }
}

/// Backlog depth read from `<dir>/<worker_type>`, written by whatever
/// exports broker queue stats.
pub struct FileQueueInspector {
    dir: PathBuf,
}

impl FileQueueInspector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl QueueInspector for FileQueueInspector {
    async fn backlog(&self, worker_type: &WorkerType) -> VigilResult<u64> {
        let path = entry_path(&self.dir, worker_type.as_str())
            .ok_or_else(|| VigilError::Internal(format!("Invalid worker type name: {}", worker_type)))?;

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| VigilError::Internal(format!("Failed to read backlog {:?}: {}", path, e)))?;

        contents
            .trim()
            .parse()
            .map_err(|e| VigilError::Internal(format!("Invalid backlog value in {:?}: {}", path, e)))
    }
}

/// Rejects names that would escape `dir`.
fn entry_path(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return None;
    }
    Some(dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_heartbeat_age() {
        let dir = tempfile::tempdir().unwrap();
        let heartbeat = FileHeartbeat::new(dir.path());
        let id = WorkerId::new("tp-1");

        assert_eq!(heartbeat.heartbeat_age(&id).await, None);

        std::fs::write(dir.path().join("tp-1"), b"").unwrap();
        let age = heartbeat.heartbeat_age(&id).await.unwrap();
        assert!(age < 5.0);

        assert_eq!(heartbeat.heartbeat_age(&WorkerId::new("../etc")).await, None);
    }

    #[tokio::test]
    async fn test_file_queue_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = FileQueueInspector::new(dir.path());
        let worker_type = WorkerType::new("task-processor");

        assert!(inspector.backlog(&worker_type).await.is_err());

        std::fs::write(dir.path().join("task-processor"), "1500\n").unwrap();
        assert_eq!(inspector.backlog(&worker_type).await.unwrap(), 1500);

        std::fs::write(dir.path().join("task-processor"), "lots").unwrap();
        assert!(inspector.backlog(&worker_type).await.is_err());
    }
}
