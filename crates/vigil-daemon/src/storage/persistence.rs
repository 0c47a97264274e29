use async_trait::async_trait;
use uuid::Uuid;
use vigil_types::{RecoveryAttempt, SupervisionEvent, VigilError, VigilResult};

use super::SupervisorStorage;
use crate::profile::ProfilePersistence;

impl SupervisorStorage {
    /// Runs a sled call on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> VigilResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SupervisorStorage) -> VigilResult<T> + Send + 'static,
    {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || op(&storage))
            .await
            .map_err(|e| VigilError::Internal(format!("Storage task failed: {}", e)))?
    }
}

#[async_trait]
impl ProfilePersistence for SupervisorStorage {
    async fn append_attempt(&self, attempt: &RecoveryAttempt) -> VigilResult<()> {
        let attempt = attempt.clone();
        self.blocking(move |s| s.append_attempt_record(&attempt)).await
    }

    async fn load_attempts(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        self.blocking(|s| s.attempt_records()).await
    }

    async fn put_inflight(&self, attempt: &RecoveryAttempt) -> VigilResult<()> {
        let attempt = attempt.clone();
        self.blocking(move |s| s.put_inflight_record(&attempt)).await
    }

    async fn remove_inflight(&self, attempt_id: Uuid) -> VigilResult<()> {
        self.blocking(move |s| s.remove_inflight_record(attempt_id).map(|_| ())).await
    }

    async fn load_inflight(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        self.blocking(|s| s.inflight_records()).await
    }

    async fn append_event(&self, event: &SupervisionEvent) -> VigilResult<()> {
        let event = event.clone();
        self.blocking(move |s| s.append_event_record(&event)).await
    }

    async fn load_events(&self) -> VigilResult<Vec<SupervisionEvent>> {
        self.blocking(|s| s.event_records()).await
    }
}
