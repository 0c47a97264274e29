use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_types::{Outcome, RecoveryAttempt, VigilError, VigilResult};

use super::snapshot::ProfileSnapshot;
use super::writer::{PendingWrite, PersistenceWriter, WriteStatus};
use crate::config::LearningConfig;

/// Owner of the learned strategy profiles.
///
/// `record` folds a finalized attempt into a fresh snapshot and appends it to
/// the durable log; readers take the current snapshot without blocking
/// writers.
pub struct ProfileStore {
    writer: Arc<PersistenceWriter>,
    learning: LearningConfig,
    snapshot: RwLock<Arc<ProfileSnapshot>>,
}

impl ProfileStore {
    pub fn new(writer: Arc<PersistenceWriter>, learning: LearningConfig) -> Self {
        Self {
            writer,
            learning,
            snapshot: RwLock::new(Arc::new(ProfileSnapshot::new())),
        }
    }

    /// Rebuilds the profiles by replaying the persisted attempt log.
    pub async fn open(writer: Arc<PersistenceWriter>, learning: LearningConfig) -> VigilResult<Self> {
        let attempts = writer.backend().load_attempts().await?;
        let snapshot = ProfileSnapshot::replay(&attempts, &learning);
        info!(
            "Loaded {} recovery attempt(s) into {} strategy profile(s)",
            snapshot.applied(),
            snapshot.len()
        );

        Ok(Self {
            writer,
            learning,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn snapshot(&self) -> Arc<ProfileSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn writer(&self) -> &Arc<PersistenceWriter> {
        &self.writer
    }

    pub async fn record(&self, attempt: &RecoveryAttempt) -> VigilResult<WriteStatus> {
        if !attempt.is_finalized() {
            return Err(VigilError::Internal(format!(
                "Attempt {} recorded before finalization",
                attempt.attempt_id
            )));
        }

        {
            let mut current = self.snapshot.write();
            let mut next = ProfileSnapshot::clone(&current);
            next.apply(attempt, &self.learning);
            *current = Arc::new(next);
        }

        debug!(
            "Recorded attempt {} ({} {} {} -> {:?})",
            attempt.attempt_id,
            attempt.worker_type,
            attempt.failure_category,
            attempt.chosen_strategy,
            attempt.outcome
        );

        Ok(self.writer.submit(PendingWrite::Attempt(attempt.clone())).await)
    }

    pub async fn mark_inflight(&self, attempt: &RecoveryAttempt) -> WriteStatus {
        self.writer.submit(PendingWrite::Inflight(attempt.clone())).await
    }

    pub async fn clear_inflight(&self, attempt_id: Uuid) -> WriteStatus {
        self.writer.submit(PendingWrite::ClearInflight(attempt_id)).await
    }

    /// Finalizes attempts a previous run left in flight as `Timeout`.
    pub async fn recover_orphans(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        let orphans = self.writer.backend().load_inflight().await?;
        let mut recovered = Vec::with_capacity(orphans.len());

        for mut attempt in orphans {
            let attempt_id = attempt.attempt_id;
            if !attempt.is_finalized() {
                attempt.finalize(
                    Outcome::Timeout,
                    Some("supervisor stopped before the attempt completed".into()),
                );
            }
            warn!(
                "Recovered orphaned attempt {} for {} as {:?}",
                attempt_id, attempt.worker_id, attempt.outcome
            );
            self.record(&attempt).await?;
            self.clear_inflight(attempt_id).await;
            recovered.push(attempt);
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceConfig;
    use crate::profile::{MemoryPersistence, ProfilePersistence};
    use vigil_types::{FailureCategory, Strategy, WorkerId, WorkerType};

    fn attempt(outcome: Option<Outcome>) -> RecoveryAttempt {
        let mut attempt = RecoveryAttempt::start(
            WorkerId::new("w-1"),
            WorkerType::new("task-processor"),
            FailureCategory::Unresponsive,
            Strategy::SoftRestart,
        );
        if let Some(outcome) = outcome {
            attempt.finalize(outcome, None);
        }
        attempt
    }

    fn store(backend: Arc<MemoryPersistence>) -> ProfileStore {
        let writer = Arc::new(PersistenceWriter::new(backend, &PersistenceConfig::default()));
        ProfileStore::new(writer, LearningConfig::default())
    }

    #[tokio::test]
    async fn test_record_updates_snapshot_copy_on_read() {
        let backend = Arc::new(MemoryPersistence::new());
        let store = store(backend.clone());
        let before = store.snapshot();

        store.record(&attempt(Some(Outcome::Success))).await.unwrap();

        assert!(before.is_empty());
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(backend.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_unfinalized_record_rejected() {
        let store = store(Arc::new(MemoryPersistence::new()));
        assert!(store.record(&attempt(None)).await.is_err());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_learning() {
        let backend = Arc::new(MemoryPersistence::new());
        let store = store(backend.clone());
        backend.set_failing(true);

        let status = store.record(&attempt(Some(Outcome::Failure))).await.unwrap();
        assert_eq!(status, WriteStatus::Buffered);
        assert_eq!(store.snapshot().applied(), 1);

        backend.set_failing(false);
        store.writer().flush().await.unwrap();
        assert_eq!(backend.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_orphans_finalized_as_timeout() {
        let backend = Arc::new(MemoryPersistence::new());
        let orphan = attempt(None);
        backend.put_inflight(&orphan).await.unwrap();

        let writer = Arc::new(PersistenceWriter::new(backend.clone(), &PersistenceConfig::default()));
        let store = ProfileStore::open(writer, LearningConfig::default()).await.unwrap();
        let recovered = store.recover_orphans().await.unwrap();

        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].outcome, Some(Outcome::Timeout));
        assert!(backend.inflight().is_empty());
        assert_eq!(backend.attempts().len(), 1);
        assert_eq!(store.snapshot().applied(), 1);
    }
}
