use serde::{de::DeserializeOwned, Serialize};
use sled::Tree;
use std::sync::atomic::Ordering;
use uuid::Uuid;
use vigil_types::{RecoveryAttempt, SupervisionEvent, VigilError, VigilResult, WorkerId};

use super::SupervisorStorage;

impl SupervisorStorage {
    fn next_key(&self) -> VigilResult<[u8; 8]> {
        self.db
            .generate_id()
            .map(|id| id.to_be_bytes())
            .map_err(|e| VigilError::Storage(format!("Failed to allocate sequence: {}", e)))
    }

    fn encode<T: Serialize>(&self, value: &T, what: &str) -> VigilResult<Vec<u8>> {
        let bytes = bincode::serialize(value).map_err(|e| {
            self.metrics.record_error();
            VigilError::Serialization(format!("Failed to serialize {}: {}", what, e))
        })?;
        self.metrics.record_write(bytes.len());
        Ok(bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8], what: &str) -> VigilResult<T> {
        self.metrics.record_read(bytes.len());
        bincode::deserialize(bytes).map_err(|e| {
            self.metrics.record_error();
            VigilError::Serialization(format!("Failed to deserialize {}: {}", what, e))
        })
    }

    fn insert(&self, tree: &Tree, key: &[u8], value: Vec<u8>, what: &str) -> VigilResult<()> {
        tree.insert(key, value).map_err(|e| {
            self.metrics.record_error();
            VigilError::Storage(format!("Failed to store {}: {}", what, e))
        })?;
        Ok(())
    }

    /// Values of `tree` in key order, newest last.
    fn scan<T: DeserializeOwned>(&self, tree: &Tree, what: &str) -> VigilResult<Vec<T>> {
        let mut values = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (_, value) = entry.map_err(|e| {
                self.metrics.record_error();
                VigilError::Storage(format!("Failed to iterate {}: {}", what, e))
            })?;
            values.push(self.decode(&value, what)?);
        }
        Ok(values)
    }

    /// Newest-first walk keeping at most `limit` values that pass `keep`,
    /// returned oldest first.
    fn scan_recent<T, F>(&self, tree: &Tree, what: &str, limit: usize, keep: F) -> VigilResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let mut values = Vec::new();
        for entry in tree.iter().rev() {
            if values.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(|e| {
                self.metrics.record_error();
                VigilError::Storage(format!("Failed to iterate {}: {}", what, e))
            })?;
            let decoded: T = self.decode(&value, what)?;
            if keep(&decoded) {
                values.push(decoded);
            }
        }
        values.reverse();
        Ok(values)
    }

    pub fn append_attempt_record(&self, attempt: &RecoveryAttempt) -> VigilResult<()> {
        let key = self.next_key()?;
        let value = self.encode(attempt, "attempt")?;
        self.insert(&self.attempts, &key, value, "attempt")
    }

    pub fn attempt_records(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        self.scan(&self.attempts, "attempt")
    }

    /// Most recent attempts, optionally for one worker.
    pub fn recent_attempts(&self, worker_id: Option<&WorkerId>, limit: usize) -> VigilResult<Vec<RecoveryAttempt>> {
        self.scan_recent(&self.attempts, "attempt", limit, |a: &RecoveryAttempt| {
            worker_id.map(|id| &a.worker_id == id).unwrap_or(true)
        })
    }

    pub fn put_inflight_record(&self, attempt: &RecoveryAttempt) -> VigilResult<()> {
        let value = self.encode(attempt, "in-flight attempt")?;
        self.insert(&self.inflight, attempt.attempt_id.as_bytes(), value, "in-flight attempt")
    }

    pub fn remove_inflight_record(&self, attempt_id: Uuid) -> VigilResult<bool> {
        self.metrics.deletes.fetch_add(1, Ordering::Relaxed);
        let removed = self
            .inflight
            .remove(attempt_id.as_bytes())
            .map_err(|e| {
                self.metrics.record_error();
                VigilError::Storage(format!("Failed to remove in-flight attempt: {}", e))
            })?
            .is_some();
        Ok(removed)
    }

    pub fn inflight_records(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        self.scan(&self.inflight, "in-flight attempt")
    }

    pub fn append_event_record(&self, event: &SupervisionEvent) -> VigilResult<()> {
        let key = self.next_key()?;
        let value = self.encode(event, "event")?;
        self.insert(&self.events, &key, value, "event")
    }

    pub fn event_records(&self) -> VigilResult<Vec<SupervisionEvent>> {
        self.scan(&self.events, "event")
    }

    pub fn recent_events(&self, worker_id: Option<&WorkerId>, limit: usize) -> VigilResult<Vec<SupervisionEvent>> {
        self.scan_recent(&self.events, "event", limit, |e: &SupervisionEvent| {
            worker_id.map(|id| &e.worker_id == id).unwrap_or(true)
        })
    }
}
