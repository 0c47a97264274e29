use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use vigil_types::{
    EventKind, FailureCategory, HealthSample, RecoveryAttempt, Strategy, VigilError, VigilResult,
    WorkerDescriptor, WorkerId, WorkerStatus,
};

use super::cancellation::CancellationToken;
use super::digest::StatusDigest;
use super::reset::ResetInbox;
use super::state::WorkerStateTable;
use super::stats::{ShutdownReport, SupervisorStats, TickReport};
use crate::classify::FailureClassifier;
use crate::config::{DaemonConfig, HealthConfig, SupervisorSettings};
use crate::probe::{HealthProbe, HealthProber};
use crate::profile::{Journal, PersistenceWriter, ProfilePersistence, ProfileStore};
use crate::recovery::{RecoveryActions, RecoveryExecutor, StrategySelector};
use crate::registry::{DiscoverySource, WorkerRegistry};

/// Collaborators a [`Supervisor`] is assembled from.
pub struct SupervisorParts {
    pub discovery: Arc<dyn DiscoverySource>,
    pub probe: Arc<dyn HealthProbe>,
    pub actions: RecoveryActions,
    pub persistence: Arc<dyn ProfilePersistence>,
}

#[derive(Default)]
struct Evaluation {
    events: Vec<EventKind>,
    transitions: usize,
    classified: bool,
    recover: Option<(FailureCategory, Strategy)>,
}

/// The supervision scheduler.
///
/// Every call to [`Supervisor::tick`] refreshes the registry, probes the
/// whole fleet with bounded concurrency, applies hysteresis under each
/// worker's lock and hands actionable incidents to the executor. Recoveries
/// run as spawned tasks so a slow action never holds up the next tick.
pub struct Supervisor {
    settings: SupervisorSettings,
    health: HealthConfig,
    registry: Arc<WorkerRegistry>,
    prober: Arc<HealthProber>,
    states: Arc<WorkerStateTable>,
    classifier: FailureClassifier,
    selector: StrategySelector,
    profiles: Arc<ProfileStore>,
    journal: Arc<Journal>,
    executor: Arc<RecoveryExecutor>,
    resets: Option<ResetInbox>,
    status_file: Option<PathBuf>,
    recoveries: Mutex<Vec<JoinHandle<()>>>,
    last_digest: RwLock<Option<StatusDigest>>,
    shutdown: AtomicBool,
    ticks: AtomicU64,
    resets_applied: AtomicU64,
    started_at: Instant,
}

impl Supervisor {
    /// Wires the components and replays the persisted attempt log into the
    /// strategy profiles.
    pub async fn open(config: &DaemonConfig, parts: SupervisorParts) -> VigilResult<Self> {
        let settings = config.supervisor.clone();
        let health = config.health.clone();

        let writer = Arc::new(PersistenceWriter::new(parts.persistence, &config.persistence));
        let profiles = Arc::new(ProfileStore::open(writer.clone(), config.learning.clone()).await?);
        let journal = Arc::new(Journal::new(writer));

        let registry = Arc::new(
            WorkerRegistry::new(parts.discovery, health.removal_debounce_ticks)
                .with_list_timeout(settings.discovery_timeout()),
        );
        let prober = Arc::new(HealthProber::new(
            parts.probe,
            settings.probe_timeout(),
            settings.max_concurrent_probes,
        ));
        let states = Arc::new(WorkerStateTable::new(health.window_size));

        let executor = Arc::new(RecoveryExecutor::new(
            registry.clone(),
            states.clone(),
            prober.clone(),
            parts.actions,
            profiles.clone(),
            journal.clone(),
            health.clone(),
            settings.clone(),
        ));

        Ok(Self {
            classifier: FailureClassifier::new(health.clone()),
            selector: StrategySelector::new(config.learning.clone()),
            settings,
            health,
            registry,
            prober,
            states,
            profiles,
            journal,
            executor,
            resets: None,
            status_file: None,
            recoveries: Mutex::new(Vec::new()),
            last_digest: RwLock::new(None),
            shutdown: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            resets_applied: AtomicU64::new(0),
            started_at: Instant::now(),
        })
    }

    /// Drains reset requests from `dir` at the start of every tick.
    pub fn with_reset_inbox(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resets = Some(ResetInbox::new(dir));
        self
    }

    /// Writes every published digest to `path`.
    pub fn with_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_file = Some(path.into());
        self
    }

    /// Settles attempts a previous run left in flight and restores workers
    /// that were escalated and never reset. Call once before the first tick.
    pub async fn start(&self) -> VigilResult<Vec<RecoveryAttempt>> {
        let orphans = self.profiles.recover_orphans().await?;
        if !orphans.is_empty() {
            warn!(
                "Recorded {} attempt(s) interrupted by a previous shutdown as TIMEOUT",
                orphans.len()
            );
        }

        let escalated = self.journal.escalated_workers().await?;
        for worker_id in &escalated {
            let (slot, _) = self.states.ensure(worker_id);
            let restored = slot.lock().state.restore_escalated();
            if restored {
                self.registry.pin(worker_id);
                warn!("{} is still escalated from a previous run", worker_id);
            }
        }

        info!(
            "Supervisor started (discovery: {}, {} strategy profile(s))",
            self.registry.source_name(),
            self.profiles.snapshot().len()
        );
        Ok(orphans)
    }

    pub async fn tick(&self) -> TickReport {
        if self.is_shutting_down() {
            return TickReport {
                tick: self.ticks.load(Ordering::SeqCst),
                skipped: true,
                ..Default::default()
            };
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = TickReport {
            tick,
            ..Default::default()
        };

        self.reap_recoveries().await;

        match self.registry.refresh().await {
            Ok(delta) => {
                for descriptor in &delta.added {
                    self.states.ensure(&descriptor.worker_id);
                    self.journal.record(&descriptor.worker_id, EventKind::Discovered).await;
                }
                for descriptor in &delta.removed {
                    self.states.remove(&descriptor.worker_id);
                    self.journal.record(&descriptor.worker_id, EventKind::Removed).await;
                }
                report.discovered = delta.added.len();
                report.removed = delta.removed.len();
            }
            Err(e) => warn!(
                "Discovery via {} failed, keeping the previous worker set: {}",
                self.registry.source_name(),
                e
            ),
        }

        report.resets = self.drain_resets().await;

        let descriptors = self.registry.snapshot();
        let samples = self.prober.probe_all(&descriptors).await;
        report.probed = samples.len();

        let mut decisions = Vec::new();
        for (descriptor, sample) in descriptors.iter().zip(samples) {
            let worker_id = &descriptor.worker_id;
            if sample.process_present {
                self.registry.confirm_present(worker_id);
            } else {
                let gone = self.registry.confirm_gone(worker_id);
                trace!("{} handle gone for {} tick(s)", worker_id, gone);
            }
            if self.registry.is_retired(worker_id) {
                continue;
            }

            let evaluation = self.evaluate(descriptor, sample);
            report.transitions += evaluation.transitions;
            if evaluation.classified {
                report.classified += 1;
            }
            for kind in evaluation.events {
                self.journal.record(worker_id, kind).await;
            }
            if let Some((category, strategy)) = evaluation.recover {
                decisions.push((worker_id.clone(), category, strategy));
            }
        }

        for (worker_id, category, strategy) in decisions {
            match self.executor.begin(&worker_id, category, strategy).await {
                Ok(ticket) => {
                    report.recoveries_started += 1;
                    let executor = self.executor.clone();
                    let handle = tokio::spawn(async move {
                        executor.run(ticket).await;
                    });
                    self.recoveries.lock().push(handle);
                }
                Err(e) => {
                    report.rejected += 1;
                    self.note_rejection(&worker_id, e).await;
                }
            }
        }

        if tick % self.settings.digest_interval_ticks.max(1) == 0 {
            self.publish_digest();
        }

        trace!("Tick {} complete: {:?}", tick, report);
        report
    }

    /// Applies one sample under the worker's lock.
    fn evaluate(&self, descriptor: &WorkerDescriptor, sample: HealthSample) -> Evaluation {
        let worker_id = &descriptor.worker_id;
        let mut evaluation = Evaluation::default();
        let (slot, _) = self.states.ensure(worker_id);
        let mut slot = slot.lock();

        let unhealthy = self.health.is_unhealthy(&sample);
        slot.window.push(sample);

        let status = slot.state.status;
        if status == WorkerStatus::Recovering || status.is_terminal() {
            return evaluation;
        }

        if !unhealthy {
            slot.state.consecutive_failures = 0;
            if matches!(status, WorkerStatus::Unknown | WorkerStatus::Degraded) && slot.state.transition(WorkerStatus::Healthy) {
                if status == WorkerStatus::Degraded {
                    slot.clear_incident();
                    self.registry.unpin(worker_id);
                    info!("{} is healthy again", worker_id);
                } else {
                    debug!("{} is healthy", worker_id);
                }
                evaluation.transitions += 1;
                evaluation.events.push(EventKind::StatusChanged {
                    from: status,
                    to: WorkerStatus::Healthy,
                });
            }
            return evaluation;
        }

        slot.state.consecutive_failures += 1;
        let failures = slot.state.consecutive_failures;
        trace!("{} unhealthy sample ({} in a row)", worker_id, failures);

        if matches!(status, WorkerStatus::Unknown | WorkerStatus::Healthy)
            && failures >= self.health.degrade_after
            && slot.state.transition(WorkerStatus::Degraded)
        {
            self.registry.pin(worker_id);
            info!("{} degraded after {} failed probe(s)", worker_id, failures);
            evaluation.transitions += 1;
            evaluation.events.push(EventKind::StatusChanged {
                from: status,
                to: WorkerStatus::Degraded,
            });
        }

        if slot.state.status == WorkerStatus::Degraded && failures >= self.health.recover_after {
            let category = self.classifier.classify(worker_id, slot.window.as_slice());
            evaluation.classified = true;
            evaluation.events.push(EventKind::Classified { category });

            if category.requires_action() {
                let strategy = self.selector.select_next(
                    &descriptor.worker_type,
                    category,
                    &self.profiles.snapshot(),
                    &slot.tried,
                );
                debug!("{} classified {}, selected {}", worker_id, category, strategy);
                evaluation.recover = Some((category, strategy));
            } else {
                debug!("{} classified {}, no action", worker_id, category);
            }
        }

        evaluation
    }

    async fn note_rejection(&self, worker_id: &WorkerId, err: VigilError) {
        match &err {
            e if e.is_noop() => debug!("{}", e),
            VigilError::RecoveryCapacityExhausted(_) => {
                info!("Deferring recovery of {}: {}", worker_id, err)
            }
            VigilError::Escalated(_) => debug!("{}", err),
            _ => warn!("Could not start recovery for {}: {}", worker_id, err),
        }
        self.journal
            .record(
                worker_id,
                EventKind::RecoveryRejected {
                    reason: err.to_string(),
                },
            )
            .await;
    }

    /// Requests for workers this run has not seen yet stay queued.
    async fn drain_resets(&self) -> usize {
        let Some(inbox) = &self.resets else {
            return 0;
        };
        let mut applied = 0;
        for request in inbox.pending() {
            match self.reset(&request.worker_id).await {
                Ok(true) => applied += 1,
                Ok(false) => info!("Reset for {} ignored: worker is not escalated", request.worker_id),
                Err(VigilError::WorkerNotFound(_)) => {
                    debug!("Reset for {} kept until the worker is known", request.worker_id);
                    continue;
                }
                Err(e) => warn!("Reset for {} failed: {}", request.worker_id, e),
            }
            inbox.complete(request);
        }
        applied
    }

    /// Clears an escalated worker back to UNKNOWN. Returns `false` when the
    /// worker was not escalated.
    pub async fn reset(&self, worker_id: &WorkerId) -> VigilResult<bool> {
        let slot = self
            .states
            .get(worker_id)
            .ok_or_else(|| VigilError::WorkerNotFound(worker_id.to_string()))?;

        {
            let mut slot = slot.lock();
            if slot.state.status != WorkerStatus::Escalated {
                return Ok(false);
            }
            slot.clear_incident();
            slot.window.clear();
            if !slot.state.transition(WorkerStatus::Unknown) {
                return Err(VigilError::Internal(format!("{} refused reset", worker_id)));
            }
        }

        self.registry.unpin(worker_id);
        self.resets_applied.fetch_add(1, Ordering::Relaxed);
        info!("{} reset; automatic recovery resumed", worker_id);

        self.journal.record(worker_id, EventKind::Reset).await;
        self.journal
            .record(
                worker_id,
                EventKind::StatusChanged {
                    from: WorkerStatus::Escalated,
                    to: WorkerStatus::Unknown,
                },
            )
            .await;
        Ok(true)
    }

    async fn reap_recoveries(&self) -> usize {
        let finished: Vec<JoinHandle<()>> = {
            let mut handles = self.recoveries.lock();
            let (finished, running): (Vec<_>, Vec<_>) = handles.drain(..).partition(|h| h.is_finished());
            *handles = running;
            finished
        };
        let count = finished.len();
        for handle in finished {
            if let Err(e) = handle.await {
                error!("Recovery task failed: {}", e);
            }
        }
        count
    }

    /// Waits for every spawned recovery, including ones spawned while
    /// waiting.
    pub async fn wait_for_recoveries(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.recoveries.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Recovery task failed: {}", e);
                }
            }
        }
    }

    /// Ticks every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, mut cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Supervision loop running every {:?}", interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.is_shutting_down() {
                        break;
                    }
                    self.tick().await;
                }
            }
        }

        debug!("Supervision loop ended");
    }

    /// Stops ticking, drains in-flight recoveries for up to `drain_timeout`,
    /// then records whatever is left as TIMEOUT and flushes persistence.
    pub async fn shutdown(&self, drain_timeout: Duration) -> ShutdownReport {
        info!("Initiating supervisor shutdown with {:?} drain timeout", drain_timeout);
        self.shutdown.store(true, Ordering::SeqCst);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.recoveries.lock());
        let deadline = Instant::now() + drain_timeout;
        let mut report = ShutdownReport::default();
        let mut stuck = Vec::new();

        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                stuck.push(handle);
                continue;
            }
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(Ok(())) => report.drained += 1,
                Ok(Err(e)) => warn!("Recovery task failed during drain: {}", e),
                Err(_) => stuck.push(handle),
            }
        }

        if !stuck.is_empty() {
            warn!("Drain timeout reached, aborting {} recovery task(s)", stuck.len());
            for handle in &stuck {
                handle.abort();
            }
        }

        report.abandoned = self
            .executor
            .abandon_all("supervisor shut down before the attempt completed")
            .await
            .len();

        self.publish_digest();

        if let Err(e) = self.profiles.writer().flush().await {
            warn!("Shutting down with unpersisted writes: {}", e);
            report.unflushed = self.profiles.writer().buffered();
        }

        info!(
            "Supervisor shutdown complete ({} drained, {} abandoned)",
            report.drained, report.abandoned
        );
        report
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn digest(&self) -> StatusDigest {
        StatusDigest {
            generated_at: chrono::Utc::now(),
            tick: self.ticks.load(Ordering::SeqCst),
            uptime_secs: self.started_at.elapsed().as_secs(),
            counts: self.states.counts(),
            recoveries_in_flight: self.executor.in_flight(),
            buffered_writes: self.profiles.writer().buffered(),
            workers: self.states.states(),
        }
    }

    pub fn last_digest(&self) -> Option<StatusDigest> {
        self.last_digest.read().clone()
    }

    fn publish_digest(&self) {
        let digest = self.digest();
        info!("Status: {}", digest);
        for worker_id in digest.escalated() {
            warn!("{} remains escalated", worker_id);
        }
        if let Some(path) = &self.status_file {
            if let Err(e) = digest.write_to(path) {
                warn!("Failed to write status file: {}", e);
            }
        }
        *self.last_digest.write() = Some(digest);
    }

    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            ticks: self.ticks.load(Ordering::SeqCst),
            uptime_secs: self.started_at.elapsed().as_secs(),
            workers: self.registry.len(),
            counts: self.states.counts(),
            probes: self.prober.stats(),
            recoveries: self.executor.stats(),
            persistence: self.profiles.writer().stats(),
            journal_events: self.journal.appended(),
            resets: self.resets_applied.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self, worker_id: &WorkerId) -> Option<WorkerStatus> {
        self.states.status(worker_id)
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn states(&self) -> &Arc<WorkerStateTable> {
        &self.states
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub fn executor(&self) -> &Arc<RecoveryExecutor> {
        &self.executor
    }
}
