use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;
use vigil_types::{
    EventKind, FailureCategory, IncidentAlert, Outcome, RecoveryAttempt, Severity, Strategy, WorkerId,
    WorkerStatus, WorkerType,
};

use super::*;
use crate::config::{DaemonConfig, LearningConfig, PersistenceConfig};
use crate::profile::{MemoryPersistence, ProfilePersistence, ProfileSnapshot};
use crate::recovery::{ChannelIncidentSink, ProcessScaler, RecoveryActions};
use crate::registry::RosterDiscovery;
use crate::storage::{StorageConfig, SupervisorStorage};
use crate::test_support::{roster, FakeController, FlakyDiscovery, SwitchProbe};

struct Harness {
    supervisor: Supervisor,
    config: DaemonConfig,
    roster: Arc<RosterDiscovery>,
    discovery: Arc<FlakyDiscovery>,
    probe: Arc<SwitchProbe>,
    controller: Arc<FakeController>,
    healthy: Arc<AtomicBool>,
    alerts: mpsc::UnboundedReceiver<IncidentAlert>,
    _dir: TempDir,
}

async fn build(
    workers: &[&str],
    delay: Duration,
    persistence: Arc<dyn ProfilePersistence>,
    tweak: impl FnOnce(&mut DaemonConfig),
) -> Harness {
    let dir = tempdir().unwrap();
    let mut config = DaemonConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    config.supervisor.recovery_timeout_secs = 1;
    config.supervisor.recovery_poll_interval_ms = 20;
    config.supervisor.action_timeout_secs = 5;
    tweak(&mut config);

    let roster = roster(workers);
    let discovery = Arc::new(FlakyDiscovery {
        inner: roster.clone(),
        failing: AtomicBool::new(false),
        hanging: AtomicBool::new(false),
    });
    let healthy = Arc::new(AtomicBool::new(false));
    let probe = Arc::new(SwitchProbe::new(healthy.clone()));
    let controller = Arc::new(FakeController::new(healthy.clone(), delay));
    let (sink, alerts) = ChannelIncidentSink::new();

    let parts = SupervisorParts {
        discovery: discovery.clone(),
        probe: probe.clone(),
        actions: RecoveryActions {
            controller: controller.clone(),
            scaler: Arc::new(ProcessScaler::new(controller.clone())),
            incidents: Arc::new(sink),
        },
        persistence,
    };
    let supervisor = Supervisor::open(&config, parts)
        .await
        .unwrap()
        .with_reset_inbox(config.reset_dir())
        .with_status_file(config.status_file());

    Harness {
        supervisor,
        config,
        roster,
        discovery,
        probe,
        controller,
        healthy,
        alerts,
        _dir: dir,
    }
}

async fn harness_with(
    workers: &[&str],
    delay: Duration,
    tweak: impl FnOnce(&mut DaemonConfig),
) -> (Harness, Arc<MemoryPersistence>) {
    let backend = Arc::new(MemoryPersistence::new());
    let harness = build(workers, delay, backend.clone(), tweak).await;
    (harness, backend)
}

async fn harness(workers: &[&str], delay: Duration) -> (Harness, Arc<MemoryPersistence>) {
    harness_with(workers, delay, |_| {}).await
}

async fn ticks(supervisor: &Supervisor, n: usize) -> Vec<TickReport> {
    let mut reports = Vec::with_capacity(n);
    for _ in 0..n {
        reports.push(supervisor.tick().await);
    }
    reports
}

#[tokio::test]
async fn test_degrades_on_second_unhealthy_probe() {
    let (h, backend) = harness(&["w-1"], Duration::ZERO).await;
    let id = WorkerId::new("w-1");

    let first = h.supervisor.tick().await;
    assert_eq!(first.discovered, 1);
    assert_eq!(first.probed, 1);
    assert_eq!(first.transitions, 0);
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Unknown));

    let second = h.supervisor.tick().await;
    assert_eq!(second.transitions, 1);
    assert_eq!(second.recoveries_started, 0);
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Degraded));
    assert!(h.supervisor.registry().is_pinned(&id));

    // Never healthy, so the worker degrades straight from Unknown.
    h.supervisor.shutdown(Duration::from_secs(1)).await;
    assert!(backend.events().iter().any(|e| e.worker_id == id
        && e.kind
            == EventKind::StatusChanged {
                from: WorkerStatus::Unknown,
                to: WorkerStatus::Degraded,
            }));
}

#[tokio::test]
async fn test_fourth_unhealthy_probe_starts_exactly_one_recovery() {
    let (h, backend) = harness(&["w-1"], Duration::from_millis(200)).await;
    let id = WorkerId::new("w-1");

    for report in ticks(&h.supervisor, 3).await {
        assert_eq!(report.recoveries_started, 0);
    }

    let fourth = h.supervisor.tick().await;
    assert_eq!(fourth.classified, 1);
    assert_eq!(fourth.recoveries_started, 1);
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Recovering));
    assert_eq!(h.supervisor.executor().in_flight(), 1);

    // Still unhealthy while the restart is underway.
    let fifth = h.supervisor.tick().await;
    assert_eq!(fifth.recoveries_started, 0);
    assert_eq!(fifth.rejected, 0);

    h.supervisor.wait_for_recoveries().await;
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Healthy));
    assert!(!h.supervisor.registry().is_pinned(&id));
    assert_eq!(h.supervisor.registry().get(&id).unwrap().process_handle.pid, 5_000);

    let attempts = backend.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].failure_category, FailureCategory::Unresponsive);
    assert_eq!(attempts[0].chosen_strategy, Strategy::SoftRestart);
    assert_eq!(attempts[0].outcome, Some(Outcome::Success));
    assert!(backend.inflight().is_empty());
}

#[tokio::test]
async fn test_capacity_leaves_other_workers_degraded() {
    let (h, backend) = harness_with(&["w-1", "w-2", "w-3"], Duration::from_millis(200), |c| {
        c.supervisor.max_concurrent_recoveries = 1;
    })
    .await;

    let fourth = ticks(&h.supervisor, 4).await.pop().unwrap();
    assert_eq!(fourth.recoveries_started, 1);
    assert_eq!(fourth.rejected, 2);

    let counts = h.supervisor.states().counts();
    assert_eq!(counts.recovering, 1);
    assert_eq!(counts.degraded, 2);

    let rejected = backend
        .events()
        .iter()
        .filter(|e| matches!(e.kind, EventKind::RecoveryRejected { .. }))
        .count();
    assert_eq!(rejected, 2);

    // The restart flips the whole fake fleet healthy.
    h.supervisor.wait_for_recoveries().await;
    h.supervisor.tick().await;
    assert_eq!(h.supervisor.states().counts().healthy, 3);
    assert_eq!(backend.attempts().len(), 1);
}

#[tokio::test]
async fn test_escalates_after_three_failures_until_reset() {
    let (mut h, backend) = harness(&["w-1"], Duration::ZERO).await;
    let id = WorkerId::new("w-1");
    h.controller.fail_start.store(true, Ordering::SeqCst);

    ticks(&h.supervisor, 4).await;
    h.supervisor.wait_for_recoveries().await;
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Degraded));

    for _ in 0..2 {
        let report = h.supervisor.tick().await;
        assert_eq!(report.recoveries_started, 1);
        h.supervisor.wait_for_recoveries().await;
    }
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Escalated));

    let strategies: Vec<Strategy> = backend.attempts().iter().map(|a| a.chosen_strategy).collect();
    assert_eq!(
        strategies,
        vec![Strategy::SoftRestart, Strategy::HardRestart, Strategy::SoftRestart]
    );

    let alert = h.alerts.recv().await.unwrap();
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.worker_id, id);

    for report in ticks(&h.supervisor, 3).await {
        assert_eq!(report.recoveries_started, 0);
        assert_eq!(report.rejected, 0);
    }
    assert_eq!(backend.attempts().len(), 3);
    assert_eq!(h.supervisor.digest().escalated(), vec![&id]);

    ResetInbox::request(&h.config.reset_dir(), &id).unwrap();
    let report = h.supervisor.tick().await;
    assert_eq!(report.resets, 1);
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Unknown));

    h.controller.fail_start.store(false, Ordering::SeqCst);
    ticks(&h.supervisor, 3).await;
    h.supervisor.wait_for_recoveries().await;
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Healthy));
    assert_eq!(backend.attempts().len(), 4);
    assert_eq!(h.supervisor.stats().resets, 1);

    let mut open = false;
    for event in backend.events().iter().filter(|e| e.worker_id == id) {
        match event.kind {
            EventKind::RecoveryStarted { .. } => {
                assert!(!open, "attempts overlapped");
                open = true;
            }
            EventKind::RecoveryFinished { .. } => {
                assert!(open);
                open = false;
            }
            _ => {}
        }
    }
    assert!(!open);
}

#[tokio::test]
async fn test_reset_of_healthy_worker_is_ignored() {
    let (h, _) = harness(&["w-1"], Duration::ZERO).await;
    let id = WorkerId::new("w-1");
    h.healthy.store(true, Ordering::SeqCst);
    h.supervisor.tick().await;

    assert!(!h.supervisor.reset(&id).await.unwrap());
    assert!(h.supervisor.reset(&WorkerId::new("nope")).await.is_err());
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Healthy));
}

#[tokio::test]
async fn test_healthy_probe_closes_incident() {
    let (h, _) = harness(&["w-1"], Duration::ZERO).await;
    let id = WorkerId::new("w-1");

    ticks(&h.supervisor, 2).await;
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Degraded));

    h.healthy.store(true, Ordering::SeqCst);
    let report = h.supervisor.tick().await;
    assert_eq!(report.transitions, 1);
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Healthy));
    assert_eq!(h.supervisor.states().state(&id).unwrap().consecutive_failures, 0);
    assert!(!h.supervisor.registry().is_pinned(&id));
}

#[tokio::test]
async fn test_discovery_failure_keeps_previous_set() {
    let (h, _) = harness(&["w-1", "w-2"], Duration::ZERO).await;
    h.healthy.store(true, Ordering::SeqCst);

    assert_eq!(h.supervisor.tick().await.discovered, 2);

    h.discovery.failing.store(true, Ordering::SeqCst);
    let report = h.supervisor.tick().await;
    assert_eq!(report.discovered, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.probed, 2);
    assert_eq!(h.supervisor.registry().len(), 2);
}

#[tokio::test]
async fn test_unanswered_discovery_does_not_stall_tick() {
    let (h, _) = harness_with(&["w-1", "w-2"], Duration::ZERO, |c| {
        c.supervisor.discovery_timeout_ms = 50;
    })
    .await;
    h.healthy.store(true, Ordering::SeqCst);
    assert_eq!(h.supervisor.tick().await.discovered, 2);

    h.discovery.hanging.store(true, Ordering::SeqCst);
    let report = tokio::time::timeout(Duration::from_secs(2), h.supervisor.tick())
        .await
        .expect("tick must finish without discovery");
    assert_eq!(report.probed, 2);
    assert_eq!(report.removed, 0);
    assert_eq!(h.supervisor.registry().len(), 2);
}

#[tokio::test]
async fn test_vanished_worker_removed_after_debounce() {
    let (h, backend) = harness_with(&["w-1", "w-2"], Duration::ZERO, |c| {
        c.health.degrade_after = 3;
    })
    .await;
    let gone = WorkerId::new("w-2");
    h.healthy.store(true, Ordering::SeqCst);
    h.supervisor.tick().await;

    h.roster.remove(&gone);
    h.probe.gone.lock().insert(gone.clone());

    let reports = ticks(&h.supervisor, 3).await;
    assert_eq!(reports[0].removed, 0);
    assert_eq!(reports[1].removed, 0);
    assert_eq!(reports[2].removed, 1);
    assert_eq!(reports[2].probed, 1);

    assert_eq!(h.supervisor.status(&gone), None);
    assert_eq!(h.supervisor.states().len(), 1);
    assert!(backend
        .events()
        .iter()
        .any(|e| e.worker_id == gone && e.kind == EventKind::Removed));
}

#[tokio::test]
async fn test_shutdown_abandons_stuck_recovery() {
    let (h, backend) = harness_with(&["w-1"], Duration::from_secs(5), |c| {
        c.supervisor.action_timeout_secs = 30;
    })
    .await;
    let id = WorkerId::new("w-1");

    ticks(&h.supervisor, 4).await;
    assert_eq!(h.supervisor.executor().in_flight(), 1);

    let report = h.supervisor.shutdown(Duration::from_millis(100)).await;
    assert_eq!(report.drained, 0);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.unflushed, 0);

    let attempts = backend.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, Some(Outcome::Timeout));
    assert!(backend.inflight().is_empty());
    assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Degraded));

    assert!(h.supervisor.tick().await.skipped);
}

#[tokio::test]
async fn test_shutdown_drains_running_recovery() {
    let (h, backend) = harness(&["w-1"], Duration::from_millis(50)).await;

    ticks(&h.supervisor, 4).await;
    let report = h.supervisor.shutdown(Duration::from_secs(3)).await;
    assert_eq!(report.drained, 1);
    assert_eq!(report.abandoned, 0);
    assert_eq!(backend.attempts()[0].outcome, Some(Outcome::Success));
}

#[tokio::test]
async fn test_start_closes_orphaned_attempts() {
    let backend = Arc::new(MemoryPersistence::new());
    let orphan = RecoveryAttempt::start(
        WorkerId::new("w-1"),
        WorkerType::new("task-processor"),
        FailureCategory::Crashed,
        Strategy::HardRestart,
    );
    backend.put_inflight(&orphan).await.unwrap();

    let h = build(&["w-1"], Duration::ZERO, backend.clone(), |_| {}).await;
    let closed = h.supervisor.start().await.unwrap();

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].attempt_id, orphan.attempt_id);
    assert_eq!(closed[0].outcome, Some(Outcome::Timeout));
    assert!(backend.inflight().is_empty());
    assert_eq!(backend.attempts().len(), 1);
    assert_eq!(h.supervisor.profiles().snapshot().applied(), 1);
}

#[tokio::test]
async fn test_digest_written_to_status_file() {
    let (h, _) = harness_with(&["w-1", "w-2"], Duration::ZERO, |c| {
        c.supervisor.digest_interval_ticks = 1;
    })
    .await;
    h.healthy.store(true, Ordering::SeqCst);
    h.supervisor.tick().await;

    let digest = StatusDigest::load(&h.config.status_file()).unwrap();
    assert_eq!(digest.tick, 1);
    assert_eq!(digest.counts.healthy, 2);
    assert_eq!(digest.workers.len(), 2);
    assert_eq!(h.supervisor.last_digest(), Some(digest));
}

#[tokio::test]
async fn test_run_loop_stops_on_cancel() {
    let (h, _) = harness(&["w-1"], Duration::ZERO).await;
    h.healthy.store(true, Ordering::SeqCst);
    let supervisor = Arc::new(h.supervisor);

    let (cancel, token) = CancellationToken::new();
    let handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run(Duration::from_millis(10), token).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    handle.await.unwrap();

    let ticks = supervisor.stats().ticks;
    assert!(ticks >= 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(supervisor.stats().ticks, ticks);
}

#[tokio::test]
async fn test_learning_survives_restart_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store");
    let open = || SupervisorStorage::open(StorageConfig::from_persistence(&path, &PersistenceConfig::default())).unwrap();

    let before = {
        let storage = open();
        let h = build(&["w-1"], Duration::ZERO, Arc::new(storage.clone()), |_| {}).await;
        let id = WorkerId::new("w-1");

        h.controller.fail_start.store(true, Ordering::SeqCst);
        ticks(&h.supervisor, 4).await;
        h.supervisor.wait_for_recoveries().await;

        h.controller.fail_start.store(false, Ordering::SeqCst);
        h.supervisor.tick().await;
        h.supervisor.wait_for_recoveries().await;
        assert_eq!(h.supervisor.status(&id), Some(WorkerStatus::Healthy));

        h.supervisor.shutdown(Duration::from_secs(1)).await;
        storage.flush().unwrap();
        (*h.supervisor.profiles().snapshot()).clone()
    };
    assert_eq!(before.applied(), 2);

    let storage = open();
    let attempts = storage.attempt_records().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].outcome, Some(Outcome::Failure));
    assert_eq!(attempts[1].outcome, Some(Outcome::Success));

    let replayed = ProfileSnapshot::replay(&attempts, &LearningConfig::default());
    assert!(replayed.approx_eq(&before, 1e-9));

    let h = build(&["w-1"], Duration::ZERO, Arc::new(storage.clone()), |_| {}).await;
    assert!(h.supervisor.profiles().snapshot().approx_eq(&before, 1e-9));
}

async fn escalate(h: &Harness) {
    h.controller.fail_start.store(true, Ordering::SeqCst);
    ticks(&h.supervisor, 4).await;
    h.supervisor.wait_for_recoveries().await;
    for _ in 0..2 {
        h.supervisor.tick().await;
        h.supervisor.wait_for_recoveries().await;
    }
}

#[tokio::test]
async fn test_escalation_survives_restart() {
    let backend = Arc::new(MemoryPersistence::new());
    let id = WorkerId::new("w-1");

    let first = build(&["w-1"], Duration::ZERO, backend.clone(), |_| {}).await;
    escalate(&first).await;
    assert_eq!(first.supervisor.status(&id), Some(WorkerStatus::Escalated));
    first.supervisor.shutdown(Duration::from_secs(1)).await;
    assert_eq!(backend.attempts().len(), 3);

    let second = build(&["w-1"], Duration::ZERO, backend.clone(), |_| {}).await;
    second.supervisor.start().await.unwrap();
    assert_eq!(second.supervisor.status(&id), Some(WorkerStatus::Escalated));
    assert!(second.supervisor.registry().is_pinned(&id));

    for report in ticks(&second.supervisor, 5).await {
        assert_eq!(report.recoveries_started, 0);
    }
    assert_eq!(second.supervisor.status(&id), Some(WorkerStatus::Escalated));
    assert_eq!(backend.attempts().len(), 3);
}

#[tokio::test]
async fn test_reset_requested_while_stopped_applies_on_start() {
    let backend = Arc::new(MemoryPersistence::new());
    let id = WorkerId::new("w-1");

    let first = build(&["w-1"], Duration::ZERO, backend.clone(), |_| {}).await;
    escalate(&first).await;
    first.supervisor.shutdown(Duration::from_secs(1)).await;

    let second = build(&["w-1"], Duration::ZERO, backend.clone(), |_| {}).await;
    ResetInbox::request(&second.config.reset_dir(), &id).unwrap();
    second.supervisor.start().await.unwrap();

    let report = second.supervisor.tick().await;
    assert_eq!(report.resets, 1);
    assert_eq!(second.supervisor.status(&id), Some(WorkerStatus::Unknown));
    assert!(ResetInbox::new(second.config.reset_dir()).pending().is_empty());

    let third = build(&["w-1"], Duration::ZERO, backend.clone(), |_| {}).await;
    third.supervisor.start().await.unwrap();
    assert_eq!(third.supervisor.status(&id), None);
    third.supervisor.tick().await;
    assert_eq!(third.supervisor.status(&id), Some(WorkerStatus::Unknown));
}

#[tokio::test]
async fn test_reset_for_unseen_worker_stays_queued() {
    let (h, _) = harness(&["w-1"], Duration::ZERO).await;
    h.healthy.store(true, Ordering::SeqCst);
    let late = WorkerId::new("w-late");
    let inbox = ResetInbox::new(h.config.reset_dir());

    ResetInbox::request(inbox.dir(), &late).unwrap();
    let report = h.supervisor.tick().await;
    assert_eq!(report.resets, 0);
    assert_eq!(inbox.pending().len(), 1);

    h.roster.upsert(crate::test_support::descriptor("w-late", 300));
    let report = h.supervisor.tick().await;
    assert_eq!(report.discovered, 1);
    assert_eq!(report.resets, 0);
    assert!(inbox.pending().is_empty());
}
