use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;
use vigil_types::{RecoveryAttempt, SupervisionEvent, VigilError, VigilResult};

/// Durable home of the attempt log, the in-flight set and the supervision
/// journal. Appends must preserve call order.
#[async_trait]
pub trait ProfilePersistence: Send + Sync {
    async fn append_attempt(&self, attempt: &RecoveryAttempt) -> VigilResult<()>;

    /// Finalized attempts in append order.
    async fn load_attempts(&self) -> VigilResult<Vec<RecoveryAttempt>>;

    async fn put_inflight(&self, attempt: &RecoveryAttempt) -> VigilResult<()>;

    async fn remove_inflight(&self, attempt_id: Uuid) -> VigilResult<()>;

    async fn load_inflight(&self) -> VigilResult<Vec<RecoveryAttempt>>;

    async fn append_event(&self, event: &SupervisionEvent) -> VigilResult<()>;

    /// Journal entries in append order.
    async fn load_events(&self) -> VigilResult<Vec<SupervisionEvent>>;
}

/// In-process backend with switchable write failures and latency.
#[derive(Default)]
pub struct MemoryPersistence {
    attempts: Mutex<Vec<RecoveryAttempt>>,
    inflight: Mutex<BTreeMap<Uuid, RecoveryAttempt>>,
    events: Mutex<Vec<SupervisionEvent>>,
    failing: AtomicBool,
    write_delay_ms: AtomicU64,
    write_calls: AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<RecoveryAttempt> {
        self.attempts.lock().clone()
    }

    pub fn inflight(&self) -> Vec<RecoveryAttempt> {
        self.inflight.lock().values().cloned().collect()
    }

    pub fn events(&self) -> Vec<SupervisionEvent> {
        self.events.lock().clone()
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    async fn before_write(&self) -> VigilResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(VigilError::PersistenceWriteFailed("backend unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfilePersistence for MemoryPersistence {
    async fn append_attempt(&self, attempt: &RecoveryAttempt) -> VigilResult<()> {
        self.before_write().await?;
        self.attempts.lock().push(attempt.clone());
        Ok(())
    }

    async fn load_attempts(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        Ok(self.attempts())
    }

    async fn put_inflight(&self, attempt: &RecoveryAttempt) -> VigilResult<()> {
        self.before_write().await?;
        self.inflight.lock().insert(attempt.attempt_id, attempt.clone());
        Ok(())
    }

    async fn remove_inflight(&self, attempt_id: Uuid) -> VigilResult<()> {
        self.before_write().await?;
        self.inflight.lock().remove(&attempt_id);
        Ok(())
    }

    async fn load_inflight(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        Ok(self.inflight())
    }

    async fn append_event(&self, event: &SupervisionEvent) -> VigilResult<()> {
        self.before_write().await?;
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn load_events(&self) -> VigilResult<Vec<SupervisionEvent>> {
        Ok(self.events())
    }
}
