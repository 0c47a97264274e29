use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use vigil_types::{VigilError, VigilResult, WorkerId, WorkerState, WorkerStatus};

use super::state::StatusCounts;

/// Periodic fleet summary. Logged by the daemon and written to the status
/// file for `vigil status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusDigest {
    pub generated_at: DateTime<Utc>,
    pub tick: u64,
    pub uptime_secs: u64,
    pub counts: StatusCounts,
    pub recoveries_in_flight: usize,
    pub buffered_writes: usize,
    pub workers: Vec<WorkerState>,
}

impl StatusDigest {
    pub fn escalated(&self) -> Vec<&WorkerId> {
        self.workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Escalated)
            .map(|w| &w.worker_id)
            .collect()
    }

    pub fn write_to(&self, path: &Path) -> VigilResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| VigilError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VigilError::Serialization(format!("Failed to encode digest: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| VigilError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| VigilError::Storage(format!("Failed to replace {}: {}", path.display(), e)))
    }

    pub fn load(path: &Path) -> VigilResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| VigilError::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| VigilError::Serialization(format!("Invalid status file: {}", e)))
    }
}

impl fmt::Display for StatusDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} workers: {} healthy, {} degraded, {} recovering, {} escalated, {} unknown ({} recoveries in flight)",
            self.counts.total(),
            self.counts.healthy,
            self.counts.degraded,
            self.counts.recovering,
            self.counts.escalated,
            self.counts.unknown,
            self.recoveries_in_flight
        )
    }
}
