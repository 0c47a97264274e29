use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_types::{RecoveryAttempt, SupervisionEvent, VigilError, VigilResult};

use super::backoff::RetryBackoff;
use super::persistence::ProfilePersistence;
use crate::config::PersistenceConfig;

#[derive(Clone, Debug)]
pub enum PendingWrite {
    Attempt(RecoveryAttempt),
    Inflight(RecoveryAttempt),
    ClearInflight(Uuid),
    Event(SupervisionEvent),
}

impl PendingWrite {
    fn label(&self) -> &'static str {
        match self {
            PendingWrite::Attempt(_) => "attempt",
            PendingWrite::Inflight(_) => "inflight",
            PendingWrite::ClearInflight(_) => "clear-inflight",
            PendingWrite::Event(_) => "event",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    Persisted,
    Buffered,
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct WriterStats {
    pub written: u64,
    pub failures: u64,
    pub buffered: usize,
    pub dropped: u64,
}

struct BufferState {
    pending: VecDeque<PendingWrite>,
    backoff: RetryBackoff,
    next_retry: Option<Instant>,
}

/// Ordered, deadline-bounded writes to a [`ProfilePersistence`] backend.
///
/// A write that fails or times out is kept in an in-memory buffer. Once
/// anything is buffered, later writes queue behind it so the durable log
/// keeps call order; the buffer is retried with exponential backoff and
/// drained on the first successful write.
pub struct PersistenceWriter {
    backend: Arc<dyn ProfilePersistence>,
    write_timeout: Duration,
    max_buffered: usize,
    state: Mutex<BufferState>,
    written: AtomicU64,
    failures: AtomicU64,
    dropped: AtomicU64,
    buffered: AtomicUsize,
}

impl PersistenceWriter {
    pub fn new(backend: Arc<dyn ProfilePersistence>, config: &PersistenceConfig) -> Self {
        Self {
            backend,
            write_timeout: config.write_timeout(),
            max_buffered: config.max_buffered.max(1),
            state: Mutex::new(BufferState {
                pending: VecDeque::new(),
                backoff: RetryBackoff::exponential(config.retry_base(), config.retry_max()),
                next_retry: None,
            }),
            written: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            buffered: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ProfilePersistence> {
        &self.backend
    }

    pub async fn submit(&self, write: PendingWrite) -> WriteStatus {
        let mut state = self.state.lock().await;

        if !state.pending.is_empty() {
            let due = state.next_retry.map(|at| Instant::now() >= at).unwrap_or(true);
            if due {
                self.drain(&mut state).await;
            }
            if !state.pending.is_empty() {
                self.enqueue(&mut state, write);
                return WriteStatus::Buffered;
            }
        }

        match self.write_one(&write).await {
            Ok(()) => WriteStatus::Persisted,
            Err(e) => {
                warn!("Buffering {} write: {}", write.label(), e);
                self.enqueue(&mut state, write);
                Self::schedule_retry(&mut state);
                WriteStatus::Buffered
            }
        }
    }

    /// Retries the buffer now regardless of backoff. Errors if anything is
    /// still buffered afterwards.
    pub async fn flush(&self) -> VigilResult<usize> {
        let mut state = self.state.lock().await;
        let flushed = self.drain(&mut state).await;
        if state.pending.is_empty() {
            Ok(flushed)
        } else {
            Err(VigilError::PersistenceWriteFailed(format!(
                "{} write(s) still buffered",
                state.pending.len()
            )))
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            written: self.written.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            buffered: self.buffered(),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    async fn drain(&self, state: &mut BufferState) -> usize {
        let mut flushed = 0;
        while let Some(write) = state.pending.front() {
            match self.write_one(write).await {
                Ok(()) => {
                    state.pending.pop_front();
                    flushed += 1;
                }
                Err(e) => {
                    debug!("Buffered write retry failed: {}", e);
                    Self::schedule_retry(state);
                    break;
                }
            }
        }
        self.buffered.store(state.pending.len(), Ordering::Relaxed);

        if state.pending.is_empty() {
            state.backoff.reset();
            state.next_retry = None;
            if flushed > 0 {
                info!("Flushed {} buffered write(s)", flushed);
            }
        }
        flushed
    }

    fn enqueue(&self, state: &mut BufferState, write: PendingWrite) {
        if state.pending.len() >= self.max_buffered {
            if let Some(lost) = state.pending.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Write buffer full ({}), dropping oldest {} write",
                    self.max_buffered,
                    lost.label()
                );
            }
        }
        state.pending.push_back(write);
        self.buffered.store(state.pending.len(), Ordering::Relaxed);
    }

    fn schedule_retry(state: &mut BufferState) {
        let delay = state.backoff.next_delay();
        state.next_retry = Some(Instant::now() + delay);
    }

    async fn write_one(&self, write: &PendingWrite) -> VigilResult<()> {
        let backend = &self.backend;
        let op = async {
            match write {
                PendingWrite::Attempt(attempt) => backend.append_attempt(attempt).await,
                PendingWrite::Inflight(attempt) => backend.put_inflight(attempt).await,
                PendingWrite::ClearInflight(id) => backend.remove_inflight(*id).await,
                PendingWrite::Event(event) => backend.append_event(event).await,
            }
        };

        let result = match tokio::time::timeout(self.write_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(VigilError::PersistenceWriteFailed(format!(
                "{} write timed out after {:?}",
                write.label(),
                self.write_timeout
            ))),
        };

        match &result {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}
