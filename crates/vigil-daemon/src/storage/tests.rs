use super::*;
use crate::profile::ProfilePersistence;
use tempfile::tempdir;
use vigil_types::{
    EventKind, FailureCategory, Outcome, RecoveryAttempt, Strategy, SupervisionEvent, WorkerId, WorkerType,
};

fn finished(worker: &str, strategy: Strategy, outcome: Outcome) -> RecoveryAttempt {
    let mut attempt = RecoveryAttempt::start(
        WorkerId::new(worker),
        WorkerType::new("task-processor"),
        FailureCategory::Crashed,
        strategy,
    );
    attempt.finalize(outcome, None);
    attempt
}

fn on_disk(path: &std::path::Path) -> StorageConfig {
    StorageConfig {
        path: path.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn test_schema_initialized() {
    let storage = SupervisorStorage::in_memory().unwrap();
    assert_eq!(storage.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(storage.is_in_memory());
}

#[test]
fn test_attempts_keep_append_order() {
    let storage = SupervisorStorage::in_memory().unwrap();
    let attempts: Vec<RecoveryAttempt> = (0..20)
        .map(|i| finished(&format!("w-{}", i % 3), Strategy::SoftRestart, Outcome::Success))
        .collect();
    for attempt in &attempts {
        storage.append_attempt_record(attempt).unwrap();
    }

    assert_eq!(storage.attempt_records().unwrap(), attempts);

    let recent = storage.recent_attempts(None, 5).unwrap();
    assert_eq!(recent, attempts[15..].to_vec());

    let w1 = WorkerId::new("w-1");
    let for_w1 = storage.recent_attempts(Some(&w1), 100).unwrap();
    assert!(!for_w1.is_empty());
    assert!(for_w1.iter().all(|a| a.worker_id == w1));
}

#[test]
fn test_inflight_put_and_remove() {
    let storage = SupervisorStorage::in_memory().unwrap();
    let attempt = RecoveryAttempt::start(
        WorkerId::new("w-1"),
        WorkerType::new("task-processor"),
        FailureCategory::Unresponsive,
        Strategy::SoftRestart,
    );

    storage.put_inflight_record(&attempt).unwrap();
    assert_eq!(storage.inflight_records().unwrap(), vec![attempt.clone()]);
    assert!(storage.remove_inflight_record(attempt.attempt_id).unwrap());
    assert!(!storage.remove_inflight_record(attempt.attempt_id).unwrap());
    assert!(storage.inflight_records().unwrap().is_empty());
    assert_eq!(storage.tree_sizes().inflight, 0);
}

#[test]
fn test_recent_events() {
    let storage = SupervisorStorage::in_memory().unwrap();
    for i in 0..4 {
        let event = SupervisionEvent::new(WorkerId::new(format!("w-{}", i % 2)), EventKind::Discovered);
        storage.append_event_record(&event).unwrap();
    }

    let events = storage.recent_events(Some(&WorkerId::new("w-0")), 10).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(storage.recent_events(None, 3).unwrap().len(), 3);
    assert_eq!(storage.tree_sizes().events, 4);
}

#[test]
fn test_reopen_keeps_records() {
    let dir = tempdir().unwrap();
    let attempt = finished("w-1", Strategy::HardRestart, Outcome::Failure);

    {
        let storage = SupervisorStorage::open(on_disk(dir.path())).unwrap();
        storage.append_attempt_record(&attempt).unwrap();
        storage.flush().unwrap();
    }

    let storage = SupervisorStorage::open(on_disk(dir.path())).unwrap();
    assert_eq!(storage.attempt_records().unwrap(), vec![attempt]);
    assert!(storage.storage_metrics().snapshot().reads >= 1);
}

#[test]
fn test_newer_schema_rejected() {
    let dir = tempdir().unwrap();
    {
        let storage = SupervisorStorage::open(on_disk(dir.path())).unwrap();
        storage
            .write_schema(&SchemaInfo {
                version: CURRENT_SCHEMA_VERSION + 1,
                created_at: 0,
            })
            .unwrap();
        storage.flush().unwrap();
    }

    assert!(SupervisorStorage::open(on_disk(dir.path())).is_err());
}

#[tokio::test]
async fn test_profile_persistence_backend() {
    let storage = SupervisorStorage::in_memory().unwrap();
    let attempt = finished("w-1", Strategy::ScaleUp, Outcome::Success);

    storage.put_inflight(&attempt).await.unwrap();
    assert_eq!(storage.load_inflight().await.unwrap().len(), 1);
    storage.remove_inflight(attempt.attempt_id).await.unwrap();
    assert!(storage.load_inflight().await.unwrap().is_empty());

    storage.append_attempt(&attempt).await.unwrap();
    storage
        .append_event(&SupervisionEvent::new(WorkerId::new("w-1"), EventKind::Reset))
        .await
        .unwrap();
    assert_eq!(storage.load_attempts().await.unwrap(), vec![attempt]);
    assert_eq!(storage.recent_events(None, 10).unwrap().len(), 1);
    assert_eq!(storage.load_events().await.unwrap()[0].kind, EventKind::Reset);
}
