use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_types::{
    EventKind, FailureCategory, IncidentAlert, Outcome, ProcessHandle, RecoveryAttempt, Severity,
    Strategy, VigilError, VigilResult, WorkerDescriptor, WorkerId, WorkerStatus,
};

use super::controller::{IncidentChannel, ProcessController, Scaler};
use crate::config::{HealthConfig, SupervisorSettings};
use crate::probe::HealthProber;
use crate::profile::{Journal, ProfileStore};
use crate::registry::WorkerRegistry;
use crate::supervisor::WorkerStateTable;

/// Collaborators the executor acts through.
#[derive(Clone)]
pub struct RecoveryActions {
    pub controller: Arc<dyn ProcessController>,
    pub scaler: Arc<dyn Scaler>,
    pub incidents: Arc<dyn IncidentChannel>,
}

/// An admitted recovery: the worker is RECOVERING and holds one slot of the
/// global recovery cap until the ticket is consumed.
pub struct RecoveryTicket {
    attempt: RecoveryAttempt,
    descriptor: WorkerDescriptor,
    _permit: OwnedSemaphorePermit,
}

impl RecoveryTicket {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt.attempt_id
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.attempt.worker_id
    }

    pub fn strategy(&self) -> Strategy {
        self.attempt.chosen_strategy
    }
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub escalations: u64,
    pub in_flight: usize,
}

/// Performs recovery actions, at most one per worker at a time and at most
/// `max_concurrent_recoveries` overall.
pub struct RecoveryExecutor {
    registry: Arc<WorkerRegistry>,
    states: Arc<WorkerStateTable>,
    prober: Arc<HealthProber>,
    actions: RecoveryActions,
    profiles: Arc<ProfileStore>,
    journal: Arc<Journal>,
    health: HealthConfig,
    settings: SupervisorSettings,
    permits: Arc<Semaphore>,
    inflight: Mutex<HashMap<Uuid, RecoveryAttempt>>,
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    escalations: AtomicU64,
}

impl RecoveryExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<WorkerRegistry>,
        states: Arc<WorkerStateTable>,
        prober: Arc<HealthProber>,
        actions: RecoveryActions,
        profiles: Arc<ProfileStore>,
        journal: Arc<Journal>,
        health: HealthConfig,
        settings: SupervisorSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_recoveries.max(1)));
        Self {
            registry,
            states,
            prober,
            actions,
            profiles,
            journal,
            health,
            settings,
            permits,
            inflight: Mutex::new(HashMap::new()),
            started: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
        }
    }

    /// Begins and runs a recovery to completion.
    pub async fn execute(
        &self,
        worker_id: &WorkerId,
        failure_category: FailureCategory,
        strategy: Strategy,
    ) -> VigilResult<RecoveryAttempt> {
        let ticket = self.begin(worker_id, failure_category, strategy).await?;
        Ok(self.run(ticket).await)
    }

    /// Admits a recovery. Under the worker's lock: rejects if one is already
    /// active or the worker is escalated, takes a slot of the global cap
    /// without waiting, and moves the worker to RECOVERING.
    pub async fn begin(
        &self,
        worker_id: &WorkerId,
        failure_category: FailureCategory,
        strategy: Strategy,
    ) -> VigilResult<RecoveryTicket> {
        let descriptor = self.registry.get(worker_id)?;
        let slot = self
            .states
            .get(worker_id)
            .ok_or_else(|| VigilError::WorkerNotFound(worker_id.to_string()))?;

        let (attempt, permit, previous) = {
            let mut slot = slot.lock();

            if let Some(active) = slot.state.active_recovery_id() {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(VigilError::ConcurrentRecoveryRejected(format!(
                    "{} (attempt {})",
                    worker_id, active
                )));
            }
            if slot.state.status.is_terminal() {
                return Err(VigilError::Escalated(worker_id.to_string()));
            }
            if !slot.state.status.can_transition_to(WorkerStatus::Recovering) {
                return Err(VigilError::Internal(format!(
                    "{} cannot enter recovery from {}",
                    worker_id, slot.state.status
                )));
            }

            let permit = self
                .permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| VigilError::RecoveryCapacityExhausted(self.settings.max_concurrent_recoveries))?;

            let attempt = RecoveryAttempt::start(
                worker_id.clone(),
                descriptor.worker_type.clone(),
                failure_category,
                strategy,
            );
            let previous = slot.state.status;
            if !slot.state.begin_recovery(attempt.attempt_id) {
                return Err(VigilError::Internal(format!(
                    "{} refused recovery transition",
                    worker_id
                )));
            }
            slot.last_category = Some(failure_category);
            self.inflight.lock().insert(attempt.attempt_id, attempt.clone());
            (attempt, permit, previous)
        };

        self.started.fetch_add(1, Ordering::Relaxed);
        info!(
            "Recovering {} ({}) with {} [attempt {}]",
            worker_id, failure_category, strategy, attempt.attempt_id
        );

        self.profiles.mark_inflight(&attempt).await;
        self.journal
            .record(
                worker_id,
                EventKind::StatusChanged {
                    from: previous,
                    to: WorkerStatus::Recovering,
                },
            )
            .await;
        self.journal
            .record(
                worker_id,
                EventKind::RecoveryStarted {
                    attempt_id: attempt.attempt_id,
                    strategy,
                },
            )
            .await;

        Ok(RecoveryTicket {
            attempt,
            descriptor,
            _permit: permit,
        })
    }

    /// Performs the action, waits for the worker to come back healthy and
    /// finalizes the attempt. The cap slot is released on return.
    pub async fn run(&self, ticket: RecoveryTicket) -> RecoveryAttempt {
        let attempt_id = ticket.attempt.attempt_id;
        let worker_id = ticket.attempt.worker_id.clone();
        let strategy = ticket.attempt.chosen_strategy;

        let action = tokio::time::timeout(
            self.settings.action_timeout(),
            self.perform(&ticket.descriptor, strategy),
        )
        .await;

        let (outcome, detail) = match action {
            Err(_) => (
                Outcome::Timeout,
                Some(format!("{} did not finish within {:?}", strategy, self.settings.action_timeout())),
            ),
            Ok(Err(e)) => {
                warn!("{} on {} failed: {}", strategy, worker_id, e);
                (Outcome::Failure, Some(e.to_string()))
            }
            Ok(Ok(new_handle)) => {
                if let Some(handle) = new_handle {
                    self.registry.rebind(&worker_id, handle);
                }
                if strategy.awaits_health() {
                    self.await_health(&worker_id).await
                } else {
                    (Outcome::Success, None)
                }
            }
        };

        match self.finalize(attempt_id, outcome, detail).await {
            Some(attempt) => attempt,
            None => {
                // abandon_all got there first during shutdown.
                let mut attempt = ticket.attempt.clone();
                attempt.finalize(Outcome::Timeout, Some("abandoned during shutdown".into()));
                attempt
            }
        }
    }

    async fn perform(
        &self,
        descriptor: &WorkerDescriptor,
        strategy: Strategy,
    ) -> VigilResult<Option<ProcessHandle>> {
        let handle = descriptor.process_handle;
        let worker_type = &descriptor.worker_type;

        match strategy {
            Strategy::SoftRestart => {
                self.stop_tolerant(handle, true).await?;
                Ok(Some(self.actions.controller.start(worker_type).await?))
            }
            Strategy::HardRestart => {
                self.stop_tolerant(handle, false).await?;
                Ok(Some(self.actions.controller.start(worker_type).await?))
            }
            Strategy::ScaleUp => {
                self.actions.scaler.scale(worker_type, 1).await?;
                Ok(None)
            }
            Strategy::ScaleDown => {
                self.stop_tolerant(handle, true).await?;
                self.actions.scaler.scale(worker_type, -1).await?;
                Ok(None)
            }
            Strategy::AlertOnly => {
                let alert = IncidentAlert {
                    severity: Severity::Warning,
                    worker_id: descriptor.worker_id.clone(),
                    failure_category: self
                        .states
                        .get(&descriptor.worker_id)
                        .and_then(|s| s.lock().last_category)
                        .unwrap_or(FailureCategory::Transient),
                    chosen_strategy: strategy,
                    outcome: Outcome::Failure,
                    timestamp: Utc::now(),
                };
                if let Err(e) = self.actions.incidents.emit(alert).await {
                    warn!("Failed to emit alert for {}: {}", descriptor.worker_id, e);
                }
                Ok(None)
            }
        }
    }

    /// A process that is already gone counts as stopped.
    async fn stop_tolerant(&self, handle: ProcessHandle, graceful: bool) -> VigilResult<()> {
        match self.actions.controller.stop(handle, graceful).await {
            Ok(()) => Ok(()),
            Err(VigilError::ProcessNotFoundDuringAction(detail)) => {
                debug!("Stop target already gone ({}), continuing", detail);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn await_health(&self, worker_id: &WorkerId) -> (Outcome, Option<String>) {
        let deadline = tokio::time::Instant::now() + self.settings.recovery_timeout();

        loop {
            let descriptor = match self.registry.get(worker_id) {
                Ok(descriptor) => descriptor,
                Err(e) => return (Outcome::Failure, Some(e.to_string())),
            };
            let sample = self.prober.sample(&descriptor).await;
            if !self.health.is_unhealthy(&sample) {
                return (Outcome::Success, None);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return (
                    Outcome::Timeout,
                    Some(format!(
                        "{} not healthy within {:?}",
                        worker_id,
                        self.settings.recovery_timeout()
                    )),
                );
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.settings.recovery_poll_interval().min(remaining)).await;
        }
    }

    /// Closes an attempt exactly once. Returns `None` if it was already
    /// finalized.
    pub async fn finalize(
        &self,
        attempt_id: Uuid,
        outcome: Outcome,
        detail: Option<String>,
    ) -> Option<RecoveryAttempt> {
        let mut attempt = self.inflight.lock().remove(&attempt_id)?;
        attempt.finalize(outcome, detail);
        let worker_id = attempt.worker_id.clone();
        let strategy = attempt.chosen_strategy;

        let mut next_status = None;
        let mut retire = false;
        if let Some(slot) = self.states.get(&worker_id) {
            let mut slot = slot.lock();
            let target = if outcome.is_success() {
                slot.clear_incident();
                slot.window.clear();
                retire = strategy == Strategy::ScaleDown;
                WorkerStatus::Healthy
            } else {
                slot.recovery_failures += 1;
                slot.tried.push(strategy);
                if slot.recovery_failures >= self.settings.escalation_threshold {
                    WorkerStatus::Escalated
                } else {
                    WorkerStatus::Degraded
                }
            };
            if slot.state.end_recovery(attempt_id, target) {
                next_status = Some(target);
            }
        }

        match outcome {
            Outcome::Success => self.succeeded.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.failed.fetch_add(1, Ordering::Relaxed),
            Outcome::Timeout => self.timed_out.fetch_add(1, Ordering::Relaxed),
        };

        match next_status {
            Some(WorkerStatus::Healthy) => {
                info!(
                    "{} recovered by {} in {:.1}s",
                    worker_id,
                    strategy,
                    attempt.recovery_seconds().unwrap_or(0.0)
                );
                if retire {
                    self.registry.retire(&worker_id);
                } else {
                    self.registry.unpin(&worker_id);
                }
            }
            Some(WorkerStatus::Escalated) => {
                self.escalations.fetch_add(1, Ordering::Relaxed);
                error!(
                    "{} escalated after {} failed recovery attempt(s); automatic recovery suspended",
                    worker_id, self.settings.escalation_threshold
                );
            }
            Some(_) => {
                warn!(
                    "{} recovery with {} ended {}: {}",
                    worker_id,
                    strategy,
                    outcome,
                    attempt.detail.as_deref().unwrap_or("-")
                );
            }
            None => {}
        }

        if let Err(e) = self.profiles.record(&attempt).await {
            error!("Failed to record attempt {}: {}", attempt_id, e);
        }
        self.profiles.clear_inflight(attempt_id).await;
        self.journal
            .record(&worker_id, EventKind::RecoveryFinished { attempt_id, outcome })
            .await;

        if let Some(to) = next_status {
            self.journal
                .record(
                    &worker_id,
                    EventKind::StatusChanged {
                        from: WorkerStatus::Recovering,
                        to,
                    },
                )
                .await;
        }

        if next_status == Some(WorkerStatus::Escalated) {
            self.journal.record(&worker_id, EventKind::Escalated { attempt_id }).await;
            let alert = IncidentAlert {
                severity: Severity::Critical,
                worker_id: worker_id.clone(),
                failure_category: attempt.failure_category,
                chosen_strategy: strategy,
                outcome,
                timestamp: Utc::now(),
            };
            match tokio::time::timeout(self.settings.action_timeout(), self.actions.incidents.emit(alert)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to deliver escalation alert for {}: {}", worker_id, e),
                Err(_) => error!(
                    "Escalation alert for {} not acknowledged within {:?}",
                    worker_id,
                    self.settings.action_timeout()
                ),
            }
        }

        Some(attempt)
    }

    /// Finalizes every attempt still in flight as TIMEOUT.
    pub async fn abandon_all(&self, reason: &str) -> Vec<RecoveryAttempt> {
        let ids: Vec<Uuid> = self.inflight.lock().keys().copied().collect();
        let mut abandoned = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(attempt) = self.finalize(id, Outcome::Timeout, Some(reason.to_string())).await {
                warn!("Abandoned attempt {} for {}", id, attempt.worker_id);
                abandoned.push(attempt);
            }
        }
        abandoned
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}
