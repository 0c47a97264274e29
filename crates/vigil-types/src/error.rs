use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VigilError {
    #[error("Probe timed out for worker {0}")]
    ProbeTimeout(String),

    #[error("Process not found during recovery action: {0}")]
    ProcessNotFoundDuringAction(String),

    #[error("Recovery action failed: {0}")]
    RecoveryActionFailed(String),

    #[error("Persistence write failed: {0}")]
    PersistenceWriteFailed(String),

    #[error("Worker {0} is already recovering")]
    ConcurrentRecoveryRejected(String),

    #[error("Recovery capacity exhausted ({0} in flight)")]
    RecoveryCapacityExhausted(usize),

    #[error("Worker {0} is escalated; automatic recovery suspended")]
    Escalated(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// `ConcurrentRecoveryRejected` is an expected no-op signal rather than a
    /// failure.
    pub fn is_noop(&self) -> bool {
        matches!(self, VigilError::ConcurrentRecoveryRejected(_))
    }
}

pub type VigilResult<T> = Result<T, VigilError>;
